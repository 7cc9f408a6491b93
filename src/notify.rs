use std::fmt::Write as _;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{info, warn};
use ulid::Ulid;

/// An outgoing customer mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Delivery of customer notifications. Never fails the caller: delivery
/// problems are reported through the return value only.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> bool;
}

/// Notifier that only logs. Used when no spool directory is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> bool {
        info!(to = %notification.to, subject = %notification.subject, "notification");
        true
    }
}

/// Writes each message as `<ulid>.json` into a spool directory for an
/// external mailer to pick up.
#[derive(Debug)]
pub struct SpoolNotifier {
    dir: PathBuf,
}

impl SpoolNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Notifier for SpoolNotifier {
    async fn send(&self, notification: &Notification) -> bool {
        let body = match serde_json::to_vec_pretty(notification) {
            Ok(body) => body,
            Err(e) => {
                warn!("cannot encode notification for {}: {e}", notification.to);
                return false;
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!("cannot create mail spool {}: {e}", self.dir.display());
            return false;
        }
        let path = self.dir.join(format!("{}.json", Ulid::new()));
        match tokio::fs::write(&path, body).await {
            Ok(()) => true,
            Err(e) => {
                warn!("cannot spool notification to {}: {e}", path.display());
                false
            }
        }
    }
}

/// Shop details printed in mails and calendar invites.
#[derive(Debug, Clone, Default)]
pub struct ShopProfile {
    pub name: String,
    pub location: String,
}

/// Form-encode `s` the way HTML forms do: space becomes `+`, unreserved
/// characters pass through, everything else is `%XX`.
fn form_encode(out: &mut String, s: &str) {
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
}

/// Google Calendar "add event" link for a confirmed appointment. Start and
/// end are both the appointment start.
pub fn calendar_link(shop: &ShopProfile, customer: &str, service_label: &str, at: NaiveDateTime) -> String {
    let stamp = at.format("%Y%m%dT%H%M%S").to_string();
    let params = [
        ("action", "TEMPLATE".to_string()),
        ("text", format!("{} appointment", shop.name)),
        ("dates", format!("{stamp}/{stamp}")),
        ("details", format!("Customer: {customer}\nServices: {service_label}")),
        ("location", shop.location.clone()),
    ];
    let mut url = String::from("https://www.google.com/calendar/render?");
    for (i, (key, value)) in params.iter().enumerate() {
        if i > 0 {
            url.push('&');
        }
        url.push_str(key);
        url.push('=');
        form_encode(&mut url, value);
    }
    url
}

pub fn confirmation(
    shop: &ShopProfile,
    to: &str,
    customer: &str,
    service_label: &str,
    at: NaiveDateTime,
) -> Notification {
    let when = at.format("%Y-%m-%d %H:%M");
    let link = calendar_link(shop, customer, service_label, at);
    Notification {
        to: to.to_string(),
        subject: format!("Appointment confirmed - {}", shop.name),
        html: format!(
            "<p>Hello {customer},</p>\
             <p>Your appointment for <b>{service_label}</b> on <b>{when}</b> is confirmed.</p>\
             <p>Location: {location}</p>\
             <p><a href=\"{link}\">Add to Google Calendar</a></p>\
             <p>{shop}</p>",
            location = shop.location,
            shop = shop.name,
        ),
    }
}

pub fn rejection(shop: &ShopProfile, to: &str, customer: &str, at: Option<NaiveDateTime>) -> Notification {
    let when = at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "the requested time".to_string());
    Notification {
        to: to.to_string(),
        subject: format!("Appointment request declined - {}", shop.name),
        html: format!(
            "<p>Hello {customer},</p>\
             <p>Unfortunately the slot on <b>{when}</b> is not available.</p>\
             <p>Please pick another time on our booking page.</p>\
             <p>{shop}</p>",
            shop = shop.name,
        ),
    }
}
