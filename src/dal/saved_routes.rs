use anyhow::Error;
use sqlx::{Pool, Sqlite, query, query_as};
use tracing::{Instrument, info_span};

use crate::model::SavedRouteDb;

/// Returns the saved route with its new id
#[tracing::instrument(err, skip(pool))]
pub async fn insert_saved_route(
    route_num: &str,
    route_title: &str,
    pool: &Pool<Sqlite>,
) -> Result<SavedRouteDb, Error> {
    let saved = query_as::<_, SavedRouteDb>(
        "INSERT INTO saved_routes (route_num, route_title)
        VALUES (?, ?)
        RETURNING id, route_num, route_title",
    )
    .bind(route_num)
    .bind(route_title)
    .fetch_one(pool)
    .instrument(info_span!("Inserting saved route"))
    .await?;

    Ok(saved)
}

#[tracing::instrument(err, skip(pool))]
pub async fn get_all_saved_routes(pool: &Pool<Sqlite>) -> Result<Vec<SavedRouteDb>, Error> {
    let routes = query_as::<_, SavedRouteDb>(
        "SELECT id, route_num, route_title FROM saved_routes ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(routes)
}

/// Returns false if there was nothing to delete
#[tracing::instrument(err, skip(pool))]
pub async fn delete_saved_route(id: i64, pool: &Pool<Sqlite>) -> Result<bool, Error> {
    let result = query("DELETE FROM saved_routes WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::{delete_saved_route, get_all_saved_routes, insert_saved_route};
    use crate::dal::memory_pool;

    #[tokio::test]
    async fn test_saved_route_round_trip() -> Result<(), anyhow::Error> {
        let pool = memory_pool().await?;

        let saved = insert_saved_route("7a", "Robie", &pool).await?;
        let all = get_all_saved_routes(&pool).await?;

        assert_eq!(all, vec![saved.clone()]);
        assert_eq!(all[0].route_num, "7a");
        assert_eq!(all[0].route_title, "Robie");

        Ok(())
    }

    #[tokio::test]
    async fn test_ids_increment_and_delete() -> Result<(), anyhow::Error> {
        let pool = memory_pool().await?;

        let first = insert_saved_route("7a", "Robie", &pool).await?;
        let second = insert_saved_route("10", "Dalhousie", &pool).await?;
        // saving the same route twice is allowed
        let third = insert_saved_route("7a", "Robie", &pool).await?;
        assert!(first.id < second.id && second.id < third.id);

        assert!(delete_saved_route(first.id, &pool).await?);
        assert!(!delete_saved_route(first.id, &pool).await?);

        let all = get_all_saved_routes(&pool).await?;
        assert_eq!(all, vec![second, third]);

        Ok(())
    }
}
