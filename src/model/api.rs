use serde::{Deserialize, Serialize};

use super::BoardParams;

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub passcode: String,
    #[serde(default)]
    pub params: BoardParams,
}

#[derive(Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: String,
}
