//! Server-rendered HTML for the dashboard.

use crate::db::{ActivityRollup, ChannelRollup, SnapshotRow};
use crate::web::oauth::DiscordGuild;
use crate::web::session::WebSession;

pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} - Tally</title>
<style>
body {{ font-family: sans-serif; max-width: 56rem; margin: 2rem auto; padding: 0 1rem; color: #222; }}
a {{ color: #5865F2; }}
table {{ border-collapse: collapse; width: 100%; margin: 1rem 0; }}
th, td {{ border: 1px solid #ddd; padding: 0.4rem 0.6rem; text-align: left; }}
th {{ background: #f4f4f8; }}
nav {{ margin-bottom: 2rem; }}
nav a {{ margin-right: 1rem; }}
.error {{ color: #b00020; }}
</style>
</head>
<body>
<nav><a href="/">Home</a><a href="/dashboard">Dashboard</a></nav>
{body}
</body>
</html>
"#,
        title = escape(title),
        body = body
    )
}

pub fn index(session: Option<&WebSession>) -> String {
    let body = match session {
        Some(session) => format!(
            "<h1>Tally</h1>\
             <p>Discord server analytics.</p>\
             <p>Signed in as <strong>{}</strong>.</p>\
             <p><a href=\"/dashboard\">Open your dashboard</a> · <a href=\"/logout\">Log out</a></p>",
            escape(session.user.display_name())
        ),
        None => "<h1>Tally</h1>\
                 <p>Discord server analytics.</p>\
                 <p><a href=\"/login\">Log in with Discord</a></p>"
            .to_string(),
    };
    layout("Home", &body)
}

pub fn dashboard(session: &WebSession) -> String {
    let mut body = format!(
        "<h1>Dashboard</h1><p>Welcome, <strong>{}</strong>.</p>",
        escape(session.user.display_name())
    );
    if session.guilds.is_empty() {
        body.push_str("<p>No servers found on your account.</p>");
    } else {
        body.push_str("<h2>Your servers</h2><ul>");
        for guild in &session.guilds {
            body.push_str(&format!(
                "<li><a href=\"/analytics/{}\">{}</a></li>",
                escape(&guild.id),
                escape(&guild.name)
            ));
        }
        body.push_str("</ul>");
    }
    layout("Dashboard", &body)
}

pub fn analytics(
    guild: &DiscordGuild,
    snapshots: &[SnapshotRow],
    messages: &[ChannelRollup],
    activity: &[ActivityRollup],
) -> String {
    let mut body = format!("<h1>Analytics - {}</h1>", escape(&guild.name));

    body.push_str("<h2>Snapshots</h2>");
    if snapshots.is_empty() {
        body.push_str("<p>No data collected yet.</p>");
    } else {
        body.push_str(
            "<table><tr><th>Time (UTC)</th><th>Members</th><th>Channels</th>\
             <th>Messages</th><th>Voice minutes</th></tr>",
        );
        for row in snapshots {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&row.timestamp),
                row.member_count,
                row.channel_count,
                row.message_count,
                row.voice_minutes
            ));
        }
        body.push_str("</table>");
    }

    body.push_str("<h2>Messages by channel</h2>");
    if messages.is_empty() {
        body.push_str("<p>No messages observed in this window.</p>");
    } else {
        body.push_str("<table><tr><th>Channel</th><th>Messages</th><th>Avg length</th></tr>");
        for row in messages {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{:.1}</td></tr>",
                escape(&row.channel_id),
                row.message_count,
                row.avg_length
            ));
        }
        body.push_str("</table>");
    }

    body.push_str("<h2>Voice activity</h2>");
    if activity.is_empty() {
        body.push_str("<p>No voice activity in this window.</p>");
    } else {
        body.push_str(
            "<table><tr><th>User</th><th>Type</th><th>Count</th><th>Total seconds</th></tr>",
        );
        for row in activity {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&row.user_id),
                escape(&row.activity_type),
                row.activity_count,
                row.total_duration
            ));
        }
        body.push_str("</table>");
    }

    layout(&guild.name, &body)
}

pub fn error_page(error: &str, message: &str) -> String {
    let body = format!(
        "<h1 class=\"error\">{}</h1><p>{}</p><p><a href=\"/\">Back to home</a></p>",
        escape(error),
        escape(message)
    );
    layout(error, &body)
}

pub fn not_found() -> String {
    error_page("404", "The page you are looking for does not exist.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::oauth::DiscordUser;
    use chrono::Utc;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<script>alert("x&y")</script>"#),
            "&lt;script&gt;alert(&quot;x&amp;y&quot;)&lt;/script&gt;"
        );
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_dashboard_escapes_guild_names() {
        let session = WebSession {
            user: DiscordUser {
                id: "1".to_string(),
                username: "someone".to_string(),
                global_name: None,
                avatar: None,
            },
            guilds: vec![DiscordGuild {
                id: "10".to_string(),
                name: "<b>evil</b>".to_string(),
                icon: None,
                owner: None,
                permissions: None,
            }],
            access_token: "token".to_string(),
            created_at: Utc::now(),
        };
        let html = dashboard(&session);
        assert!(html.contains("&lt;b&gt;evil&lt;/b&gt;"));
        assert!(!html.contains("<b>evil</b>"));
        assert!(html.contains("/analytics/10"));
    }
}
