use serde::Deserialize;

use super::repo_types::Role;

/// Query string of the user administration list.
#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub approved: Option<bool>,
    pub active: Option<bool>,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}
