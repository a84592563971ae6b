//! Server-rendered HTML and presentational helpers.

use crate::model::{ExperimentInfo, User};

/// Derive a URL slug from a display name: lowercased, whitespace turned into
/// hyphens, everything outside `[a-z0-9-]` dropped. Used only for placeholder
/// text; the server never substitutes it for a missing slug.
pub fn urlify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// Discord CDN avatar URL, or `None` when the user has no avatar set.
pub fn avatar_url(user: &User) -> Option<String> {
    if user.avatar.is_empty() {
        None
    } else {
        Some(format!(
            "https://cdn.discordapp.com/avatars/{}/{}.webp?size=16",
            user.id, user.avatar
        ))
    }
}

/// Escape text for embedding in HTML.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Username with avatar and discriminator, as shown in experiment tables.
fn discord_user(user: &User) -> String {
    let avatar = avatar_url(user)
        .map(|url| format!("<img src=\"{url}\" alt=\"Discord avatar\" width=\"16\" height=\"16\"> "))
        .unwrap_or_default();
    format!(
        "{avatar}{}<span class=\"tag\">#{}</span>",
        escape(&user.username),
        escape(&user.tag)
    )
}

fn checkbox(checked: bool) -> &'static str {
    if checked {
        "<input type=\"checkbox\" disabled checked>"
    } else {
        "<input type=\"checkbox\" disabled>"
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n<main>\n{body}\n</main>\n</body>\n</html>\n"
    )
}

/// Landing page with the project blurb and, while the form is open, the
/// submission link.
pub fn index(active: bool) -> String {
    let call_to_action = if active {
        "<p><a href=\"/user/submit\">Submit your own data here.</a></p>"
    } else {
        "<p><strong>Note: The form is currently closed.</strong></p>"
    };
    let body = format!(
        "<h1>The GUOBA Project</h1>\n\
         <h3 id=\"about\">About &lsquo;The GUOBA Project&rsquo;</h3>\n\
         <p>This is a project to map out how the artifacts of players perform to improve\n\
         mathematical models/artifact standards for calculations. The problem with simulating\n\
         artifacts is that it's hard to verify if results that come from them are correct.\n\
         Players have different strategies when selecting which domain to farm/which artifact\n\
         to upgrade/which to trash.</p>\n\
         {call_to_action}\n\
         <p><a href=\"/experiments\">View experiments</a></p>"
    );
    page("The GUOBA Project", &body)
}

/// Stub login page; sessions are issued out of band and presented as a
/// `session` cookie.
pub fn login() -> String {
    page(
        "Log in | The GUOBA Project",
        "<h1>Log in</h1>\n\
         <p>Sessions are issued by the project operators. Set the issued token as the\n\
         <code>session</code> cookie to continue.</p>",
    )
}

/// Inline client for the creation form: posts the JSON payload and surfaces
/// errors as a toast that clears after ten seconds.
const CREATE_SCRIPT: &str = r#"<script>
async function createExperiment() {
  try {
    const parsed = JSON.parse(document.getElementById("template").value)
    const response = await (await fetch("/api/create-experiment", {
      method: "POST",
      body: JSON.stringify({
        name: document.getElementById("name").value,
        slug: document.getElementById("slug").value,
        char: parsed.char ?? "",
        template: parsed.template
      })
    })).json()
    if (response.error) { toast(response.error); return }
    if (response.ok) { location.reload(); return }
    toast("Unknown response")
  } catch (error) {
    toast("An error occurred while creating experiment:\n" + error)
  }
}
function toast(text) {
  const el = document.getElementById("toast")
  el.textContent = text
  setTimeout(() => { el.textContent = "" }, 10000)
}
</script>"#;

/// Admin page: experiment table plus the creation form.
pub fn admin_experiments(user: &User, experiments: &[ExperimentInfo]) -> String {
    let mut rows = String::new();
    for info in experiments {
        let e = &info.experiment;
        rows.push_str(&format!(
            "<tr><th>{}</th><td>{}</td><td>{}</td>\
             <td><a href=\"/experiments/{}\">{}</a></td>\
             <td>{}</td><td>{}</td><td>{}</td>\
             <td><a href=\"/admin/experiments/{}\"><button>Edit</button></a></td></tr>\n",
            e.id,
            checkbox(e.public),
            checkbox(e.active),
            escape(&e.slug),
            escape(&e.name),
            discord_user(&info.creator),
            escape(&e.character),
            info.data_count,
            e.id,
        ));
    }
    let body = format!(
        "<p>Logged in as {}</p>\n\
         <h3>Experiments</h3>\n\
         <table>\n<thead><tr>\
         <th>ID</th><th>Public</th><th>Active</th><th>Name</th>\
         <th>Creator</th><th>Character</th><th>Processed</th><th>Edit</th>\
         </tr></thead>\n<tbody>\n{rows}</tbody>\n</table>\n\
         <h3>Create experiment</h3>\n\
         <label>Template File\
         <textarea id=\"template\" placeholder=\"Paste your template json here\"></textarea></label>\n\
         <label>Name <input id=\"name\" type=\"text\"></label>\n\
         <label>Slug (.../experiments/[slug]) \
         <input id=\"slug\" type=\"text\" placeholder=\"{placeholder}\"></label>\n\
         <button onclick=\"createExperiment()\">Create experiment</button>\n\
         <div id=\"toast\"></div>\n\
         {CREATE_SCRIPT}",
        discord_user(user),
        placeholder = urlify("My New Experiment"),
    );
    page("Manage experiments | The GUOBA Project", &body)
}
