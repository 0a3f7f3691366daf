use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BusStop {
    /// `BUSSTOPID`
    pub id: String,
    /// `LOCATION`
    pub name: String,
    pub accessibility: Accessibility,
    pub latitude: f64,
    pub longitude: f64,
}

/// The `ACCESSIBLE` property. "Y" and "N" are the only documented values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Accessibility {
    Accessible,
    NotAccessible,
    Unknown(String),
}

impl From<&str> for Accessibility {
    fn from(value: &str) -> Self {
        match value.trim() {
            v if v.eq_ignore_ascii_case("y") || v.eq_ignore_ascii_case("yes") => {
                Accessibility::Accessible
            }
            v if v.eq_ignore_ascii_case("n") || v.eq_ignore_ascii_case("no") => {
                Accessibility::NotAccessible
            }
            v => Accessibility::Unknown(v.to_string()),
        }
    }
}
