use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use crate::db::{keys, BlobStore};
use crate::error::{HubError, Result};
use crate::models::{Theme, TicketLead, User};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// Signed-in user, ticket leads and theme preference.
pub struct SessionRepo {
    store: Arc<dyn BlobStore>,
}

impl SessionRepo {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn login(&self, user: &User) -> Result<()> {
        self.write(keys::USER, user)?;
        info!(user = %user.email, "user signed in");
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        self.store.remove(keys::USER)
    }

    pub fn current_user(&self) -> Result<Option<User>> {
        self.read(keys::USER)
    }

    pub fn record_ticket_lead(&self, lead: TicketLead) -> Result<()> {
        if !lead.consent {
            return Err(HubError::Invalid("ticket lead requires consent".into()));
        }
        if !EMAIL_RE.is_match(lead.email.trim()) {
            return Err(HubError::Invalid(format!(
                "not an email address: {:?}",
                lead.email
            )));
        }
        self.modify(keys::LEADS, |leads: &mut Vec<TicketLead>| leads.push(lead))
    }

    pub fn ticket_leads(&self) -> Result<Vec<TicketLead>> {
        Ok(self.read(keys::LEADS)?.unwrap_or_default())
    }

    pub fn theme(&self) -> Result<Theme> {
        Ok(self.read(keys::THEME)?.unwrap_or_default())
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.write(keys::THEME, &theme)
    }

    pub fn toggle_theme(&self) -> Result<Theme> {
        self.modify(keys::THEME, |theme: &mut Theme| {
            *theme = theme.toggled();
            *theme
        })
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(decode(key, self.store.get(key)?))
    }

    /// Read-modify-write of one value; missing or corrupt values start from
    /// their default.
    fn modify<T, R>(&self, key: &str, change: impl FnOnce(&mut T) -> R) -> Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let mut out = None;
        self.store.update(
            key,
            Box::new(|raw: Option<String>| -> Result<Option<String>> {
                let mut value: T = decode(key, raw).unwrap_or_default();
                out = Some(change(&mut value));
                Ok(Some(serde_json::to_string(&value)?))
            }),
        )?;
        out.ok_or_else(|| HubError::Invalid(format!("update of {key} was not applied")))
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        self.store.set(key, &payload)
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, "stored value is corrupt, ignoring it: {err}");
            None
        }
    }
}
