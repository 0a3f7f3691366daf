use serde::Serialize;
use sqlx::prelude::FromRow;

use super::bus_route::BusRoute;

#[derive(Clone, Debug, PartialEq, Eq, FromRow, Serialize)]
pub struct SavedRouteDb {
    pub id: i64,
    pub route_num: String,
    pub route_title: String,
}

impl SavedRouteDb {
    /// Whether this favorite points at the given route
    pub fn is_for(&self, route: &BusRoute) -> bool {
        self.route_num == route.route_num
    }
}

/// Keys of the `preferences` table
#[derive(Copy, Clone, Debug)]
pub enum PreferenceKey {
    DarkMode,
    UserName,
    ProfilePictureFile,
}

impl PreferenceKey {
    pub fn as_str(self) -> &'static str {
        match self {
            PreferenceKey::DarkMode => "dark_mode",
            PreferenceKey::UserName => "user_name",
            PreferenceKey::ProfilePictureFile => "profile_picture_file",
        }
    }
}
