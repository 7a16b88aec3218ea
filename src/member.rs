use crate::driver::{DriverError, Row};

/// A member account: unique identifier and plain integer balance.
///
/// No negative-balance rule lives here; that belongs to business validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: String,
    pub money: i64,
}

impl Member {
    pub fn new(id: impl Into<String>, money: i64) -> Self {
        Self {
            id: id.into(),
            money,
        }
    }
}

impl TryFrom<&Row> for Member {
    type Error = DriverError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get_text("member_id")?.to_owned(),
            money: row.get_int("money")?,
        })
    }
}
