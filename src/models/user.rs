use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The profile of the signed-in user, as returned by login and the profile
/// endpoint. The session only reads it; `role` is what route guards key on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", from = "RawUserProfile")]
pub struct UserProfile {
    /// Backends disagree on numeric vs. string ids, so it is kept as-is.
    pub id: Value,
    pub role: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Any other fields the backend sends along.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The profile as it arrives on the wire. Backends name the display name
/// differently and some send more than one of them.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUserProfile {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    role: String,
    display_name: Option<String>,
    real_name: Option<String>,
    name: Option<String>,
    nickname: Option<String>,
    avatar: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawUserProfile> for UserProfile {
    fn from(raw: RawUserProfile) -> Self {
        // Stored profiles carry `displayName`; backends send the others.
        let display_name = [raw.display_name, raw.real_name, raw.name, raw.nickname]
            .into_iter()
            .flatten()
            .next()
            .unwrap_or_default();

        UserProfile {
            id: raw.id,
            role: raw.role,
            display_name,
            avatar: raw.avatar,
            extra: raw.extra,
        }
    }
}

impl UserProfile {
    /// Create a new `UserProfile` with an optional avatar.
    pub fn new(
        id: impl Into<Value>,
        role: impl Into<String>,
        display_name: impl Into<String>,
        avatar: Option<String>,
    ) -> Self {
        UserProfile {
            id: id.into(),
            role: role.into(),
            display_name: display_name.into(),
            avatar,
            extra: Map::new(),
        }
    }
}
