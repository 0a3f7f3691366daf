use std::path::{Path, PathBuf};

use anyhow::{Context, Error, bail};
use sqlx::{Pool, Sqlite, query, query_scalar};
use tracing::{Instrument, info, info_span, warn};

use crate::model::db_model::PreferenceKey;

pub const DEFAULT_USER_NAME: &str = "User";
/// Saved pictures are named this plus the extension of their format
pub const PROFILE_PICTURE_STEM: &str = "profile_picture";

/// Extension for the image format `header` starts with, if it is one we can show
fn image_extension(header: &[u8]) -> Option<&'static str> {
    match header {
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("jpg"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("webp"),
        [b'B', b'M', ..] => Some("bmp"),
        _ => None,
    }
}

async fn get_preference(key: PreferenceKey, pool: &Pool<Sqlite>) -> Result<Option<String>, Error> {
    let value: Option<String> = query_scalar("SELECT value FROM preferences WHERE key = ?")
        .bind(key.as_str())
        .fetch_optional(pool)
        .await?;

    Ok(value)
}

async fn set_preference(key: PreferenceKey, value: &str, pool: &Pool<Sqlite>) -> Result<(), Error> {
    query(
        "INSERT INTO preferences (key, value) VALUES (?, ?)
        ON CONFLICT ( key ) DO UPDATE SET value = excluded.value",
    )
    .bind(key.as_str())
    .bind(value)
    .execute(pool)
    .instrument(info_span!("Saving preference", key = key.as_str()))
    .await?;

    Ok(())
}

/// Off unless it was turned on
#[tracing::instrument(err, skip(pool))]
pub async fn get_dark_mode(pool: &Pool<Sqlite>) -> Result<bool, Error> {
    let value = get_preference(PreferenceKey::DarkMode, pool).await?;

    Ok(match value.as_deref() {
        None => false,
        Some(v) => v.parse().unwrap_or_else(|_| {
            warn!("ignoring unreadable dark_mode value {v}");
            false
        }),
    })
}

#[tracing::instrument(err, skip(pool))]
pub async fn set_dark_mode(enabled: bool, pool: &Pool<Sqlite>) -> Result<(), Error> {
    set_preference(PreferenceKey::DarkMode, &enabled.to_string(), pool).await
}

#[tracing::instrument(err, skip(pool))]
pub async fn get_user_name(pool: &Pool<Sqlite>) -> Result<String, Error> {
    let name = get_preference(PreferenceKey::UserName, pool).await?;

    Ok(name.unwrap_or_else(|| DEFAULT_USER_NAME.to_string()))
}

#[tracing::instrument(err, skip(pool))]
pub async fn set_user_name(name: &str, pool: &Pool<Sqlite>) -> Result<(), Error> {
    set_preference(PreferenceKey::UserName, name, pool).await
}

#[tracing::instrument(err, skip(pool))]
pub async fn get_profile_picture_file(pool: &Pool<Sqlite>) -> Result<Option<String>, Error> {
    get_preference(PreferenceKey::ProfilePictureFile, pool).await
}

/// Path of the saved profile picture, if one was saved and is still on disk
#[tracing::instrument(err, skip(pool))]
pub async fn get_profile_picture_path(
    data_dir: &Path,
    pool: &Pool<Sqlite>,
) -> Result<Option<PathBuf>, Error> {
    let Some(file_name) = get_profile_picture_file(pool).await? else {
        return Ok(None);
    };

    let path = data_dir.join(file_name);
    if tokio::fs::try_exists(&path).await? {
        Ok(Some(path))
    } else {
        Ok(None)
    }
}

/// Copies the picture into `data_dir` and remembers it. Returns where it was copied to.
///
/// Files that aren't PNG, JPEG, GIF, WebP or BMP images are refused.
#[tracing::instrument(err, skip(pool))]
pub async fn set_profile_picture(
    source: &Path,
    data_dir: &Path,
    pool: &Pool<Sqlite>,
) -> Result<PathBuf, Error> {
    let picture = tokio::fs::read(source)
        .instrument(info_span!("Reading profile picture"))
        .await
        .with_context(|| format!("Couldn't read {}", source.display()))?;

    let Some(extension) = image_extension(&picture) else {
        bail!("{} isn't a PNG, JPEG, GIF, WebP or BMP image", source.display());
    };
    let file_name = format!("{PROFILE_PICTURE_STEM}.{extension}");

    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("Couldn't create {}", data_dir.display()))?;

    let destination = data_dir.join(&file_name);
    tokio::fs::write(&destination, &picture)
        .instrument(info_span!("Saving profile picture"))
        .await
        .with_context(|| format!("Couldn't write {}", destination.display()))?;

    set_preference(PreferenceKey::ProfilePictureFile, &file_name, pool).await?;

    info!(
        "saved {} byte profile picture to {}",
        picture.len(),
        destination.display()
    );

    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dal::memory_pool;

    #[tokio::test]
    async fn test_defaults() -> Result<(), anyhow::Error> {
        let pool = memory_pool().await?;

        assert!(!get_dark_mode(&pool).await?);
        assert_eq!(get_user_name(&pool).await?, "User");
        assert_eq!(get_profile_picture_file(&pool).await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_overwrite() -> Result<(), anyhow::Error> {
        let pool = memory_pool().await?;

        set_dark_mode(true, &pool).await?;
        assert!(get_dark_mode(&pool).await?);
        set_dark_mode(false, &pool).await?;
        assert!(!get_dark_mode(&pool).await?);

        set_user_name("Avery", &pool).await?;
        set_user_name("Sam", &pool).await?;
        assert_eq!(get_user_name(&pool).await?, "Sam");

        Ok(())
    }

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n";

    #[tokio::test]
    async fn test_profile_picture() -> Result<(), anyhow::Error> {
        let pool = memory_pool().await?;
        let dir = std::env::temp_dir().join(format!("myway_transit_test_{}", std::process::id()));
        let source = dir.join("picked.png");
        let data_dir = dir.join("data");
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&source, PNG_HEADER).await?;

        assert_eq!(get_profile_picture_path(&data_dir, &pool).await?, None);

        let saved = set_profile_picture(&source, &data_dir, &pool).await?;

        assert_eq!(saved, data_dir.join("profile_picture.png"));
        assert_eq!(tokio::fs::read(&saved).await?, PNG_HEADER);
        assert_eq!(
            get_profile_picture_file(&pool).await?.as_deref(),
            Some("profile_picture.png")
        );
        assert_eq!(get_profile_picture_path(&data_dir, &pool).await?, Some(saved.clone()));

        // a remembered picture that was deleted from disk isn't returned
        tokio::fs::remove_file(&saved).await?;
        assert_eq!(get_profile_picture_path(&data_dir, &pool).await?, None);

        tokio::fs::remove_dir_all(&dir).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_profile_picture_keeps_its_format() -> Result<(), anyhow::Error> {
        let pool = memory_pool().await?;
        let dir = std::env::temp_dir().join(format!("myway_transit_jpeg_{}", std::process::id()));
        let jpeg = dir.join("picked.jpeg");
        let notes = dir.join("notes.txt");
        let data_dir = dir.join("data");
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&jpeg, b"\xFF\xD8\xFF\xE0\x00\x10JFIF").await?;
        tokio::fs::write(&notes, b"not a picture").await?;

        let saved = set_profile_picture(&jpeg, &data_dir, &pool).await?;
        assert_eq!(saved, data_dir.join("profile_picture.jpg"));

        assert!(set_profile_picture(&notes, &data_dir, &pool).await.is_err());
        assert_eq!(
            get_profile_picture_file(&pool).await?.as_deref(),
            Some("profile_picture.jpg")
        );

        tokio::fs::remove_dir_all(&dir).await?;

        Ok(())
    }
}
