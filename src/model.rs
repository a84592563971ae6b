//! Data model for users, experiments, and GOOD submissions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Authenticated principal, carrying its Discord identity fields.
///
/// Users are created by operators, never through the HTTP API. The `admin`
/// flag gates experiment creation and the admin pages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Discord user id (snowflake).
    pub id: String,
    /// Display username.
    pub username: String,
    /// Discriminator shown after the username, e.g. `1234`.
    pub tag: String,
    /// Avatar hash on the Discord CDN; empty when the user has none.
    #[serde(default)]
    pub avatar: String,
    /// Whether this user may manage experiments.
    #[serde(default)]
    pub admin: bool,
    /// Id of this user's GOOD submission, once one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good_id: Option<String>,
}

/// A named data-collection campaign.
///
/// ```json
/// {
///   "id": 1,
///   "name": "Rosaria ER/EM",
///   "slug": "rosaria-er-em",
///   "character": "Rosaria",
///   "template": {"source": "Genshin Optimizer"},
///   "public": false,
///   "active": false,
///   "created_at": 1700000000,
///   "creator_id": "100"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    /// Numeric identifier, assigned on creation.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// URL slug, unique across all experiments, `^[a-z0-9-]+$`.
    pub slug: String,
    /// Character key from the template; never contains whitespace.
    pub character: String,
    /// Opaque template payload produced by Genshin Optimizer.
    pub template: Value,
    /// Whether the experiment is listed publicly.
    pub public: bool,
    /// Whether the experiment accepts submissions.
    pub active: bool,
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Id of the user that created the experiment.
    pub creator_id: String,
}

/// An [`Experiment`] joined with its creator and submission count for display.
/// Derived on read, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentInfo {
    #[serde(flatten)]
    pub experiment: Experiment,
    /// Resolved creator record.
    pub creator: User,
    /// Count of GOOD submissions attached to this experiment.
    pub data_count: usize,
}

/// GOOD ("Genshin Open Object Description") export payload, the versioned
/// open format third-party tools emit for in-game artifact state.
///
/// Artifact, character, and weapon entries are kept as raw JSON values so
/// fields added by newer format versions survive a round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoodData {
    /// Format marker; always `"GOOD"`.
    pub format: String,
    /// GOOD API version.
    pub version: u32,
    /// The app that generated this data.
    pub source: String,
    #[serde(default)]
    pub artifacts: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapons: Option<Vec<Value>>,
}

/// A stored GOOD submission tied to an experiment and submitting user.
///
/// Submissions start out unverified. The verify and process stages of the
/// submission lifecycle are not implemented here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoodSubmission {
    pub id: String,
    /// Submitting user id.
    pub user: String,
    /// Experiment the submission belongs to.
    pub experiment: u64,
    pub verified: bool,
    /// Unix timestamp of submission.
    pub created_at: u64,
    pub data: GoodData,
}
