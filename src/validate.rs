//! Validation of experiment-creation requests.

use serde_json::Value;

/// Origin string a template must declare before it is accepted.
pub const TEMPLATE_SOURCE: &str = "Genshin Optimizer";

/// Why a creation request was refused.
///
/// Every variant maps to the literal message carried in the response body;
/// the HTTP status stays at the default either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    /// Request method other than POST.
    MethodNotAllowed,
    /// No session cookie, or the session resolves to no user.
    NotLoggedIn,
    /// Caller is authenticated but not an admin.
    NoPermission,
    /// `char` missing, empty, or containing a space.
    Character,
    /// `name` missing or empty.
    Name,
    /// `slug` missing or not matching `^[a-z0-9-]+$`.
    Slug,
    /// `template` missing or not declaring the expected source.
    Template,
    /// Another experiment already uses the requested slug.
    SlugTaken,
    /// Unparsable body or an internal failure.
    Unknown,
}

impl Reject {
    /// Literal message carried in the response body.
    pub fn message(&self) -> &'static str {
        match self {
            Reject::MethodNotAllowed => "Method not allowed!",
            Reject::NotLoggedIn => "Not logged in!",
            Reject::NoPermission => "No permission!",
            Reject::Character => "Invalid character!",
            Reject::Name => "Invalid name!",
            Reject::Slug => "Invalid slug!",
            Reject::Template => "Invalid template!",
            Reject::SlugTaken => "Slug already in use!",
            Reject::Unknown => "An unknown error occurred!",
        }
    }
}

/// A creation request that passed every field check.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub name: String,
    pub slug: String,
    pub character: String,
    pub template: Value,
}

/// Parse a raw request body into a validated [`CreateRequest`].
///
/// An unparsable body maps to [`Reject::Unknown`] rather than propagating the
/// parse error; field checks never run in that case.
pub fn parse_request(body: &str) -> Result<CreateRequest, Reject> {
    let val: Value = serde_json::from_str(body).map_err(|_| Reject::Unknown)?;
    validate(&val)
}

/// Field checks in request order: character, name, slug, template.
/// The first failure wins and nothing is persisted on rejection.
pub fn validate(val: &Value) -> Result<CreateRequest, Reject> {
    let character = field_str(val, "char");
    if character.is_empty() || character.contains(' ') {
        return Err(Reject::Character);
    }
    let name = field_str(val, "name");
    if name.is_empty() {
        return Err(Reject::Name);
    }
    let slug = field_str(val, "slug");
    if !valid_slug(slug) {
        return Err(Reject::Slug);
    }
    let template = val.get("template").cloned().unwrap_or(Value::Null);
    if template.get("source").and_then(Value::as_str) != Some(TEMPLATE_SOURCE) {
        return Err(Reject::Template);
    }
    Ok(CreateRequest {
        name: name.to_string(),
        slug: slug.to_string(),
        character: character.to_string(),
        template,
    })
}

/// Slugs are non-empty strings of lowercase ASCII letters, digits, and
/// hyphens.
pub fn valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Fetch a string field, treating missing and non-string values as empty.
fn field_str<'a>(val: &'a Value, key: &str) -> &'a str {
    val.get(key).and_then(Value::as_str).unwrap_or("")
}
