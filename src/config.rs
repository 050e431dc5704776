use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};

use crate::session::Credentials;

/// The env vars needed to reach the portal.
#[derive(Debug, Deserialize)]
pub struct PortalEnv {
    portal_url: String,
    portal_username: String,
    portal_password: String,
    download_root: Option<String>,
}

pub struct PortalConfig {
    pub login_url: String,
    /// Scheme + host of the portal, used to absolutize listing links.
    pub origin: String,
    pub download_root: PathBuf,
    username: String,
    password: String,
}

impl PortalConfig {
    pub fn new() -> anyhow::Result<Self> {
        let portal_env = PortalEnv::load_from_env()?;
        let origin = origin_of(&portal_env.portal_url)?;
        Ok(Self {
            origin,
            login_url: portal_env.portal_url,
            download_root: portal_env
                .download_root
                .unwrap_or_else(|| "past_questions".to_string())
                .into(),
            username: portal_env.portal_username,
            password: portal_env.portal_password,
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

pub(crate) fn origin_of(url: &str) -> anyhow::Result<String> {
    let parsed = reqwest::Url::parse(url).context("portal url is not a valid url")?;
    let host = parsed.host_str().context("portal url has no host")?;
    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

/// Bounded-wait tuning for every point where forward progress depends on the
/// portal: the post-login marker, the injected download frame, the download
/// control, and the file landing on disk. Nothing waits unbounded.
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub login: Duration,
    pub frame: Duration,
    pub download_button: Duration,
    /// The most failure-prone wait in practice (slow network, large PDFs),
    /// so it gets the most generous bound.
    pub file: Duration,
    pub poll: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            login: Duration::from_secs(10),
            frame: Duration::from_secs(15),
            download_button: Duration::from_secs(15),
            file: Duration::from_secs(30),
            poll: Duration::from_millis(500),
        }
    }
}

/// The portal markup the scrapers depend on. There is no API; any change to
/// these names on the portal side breaks silently, so they live in one place
/// instead of being scattered across the scrapers.
///
/// `*_field` / `*_button` entries are form-field `name` attributes, the rest
/// are css selectors.
#[derive(Debug, Clone)]
pub struct PortalMarkup {
    pub username_field: &'static str,
    pub password_field: &'static str,
    pub login_button: &'static str,
    pub logout_marker: &'static str,
    pub search_field: &'static str,
    pub search_button: &'static str,
    pub result_block: &'static str,
    pub title_anchor: &'static str,
    pub year_field: &'static str,
    pub semester_field: &'static str,
    pub popup_opener: &'static str,
    pub frame: &'static str,
    pub download_button: &'static str,
}

impl Default for PortalMarkup {
    fn default() -> Self {
        Self {
            username_field: "memberID",
            password_field: "memberPassWord",
            login_button: "logMeIn",
            logout_marker: "#memberLogout",
            search_field: "keywords",
            search_button: "search",
            result_block: "div.item.biblioRecord",
            title_anchor: "a.titleField",
            year_field: "div.customField.isbnField",
            semester_field: "div.customField.collationField",
            popup_opener: ".openPopUp",
            frame: "iframe.cboxIframe",
            download_button: "#download",
        }
    }
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config =
            envy::from_env::<Self>().context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_keeps_scheme_and_host() {
        let origin = origin_of("https://balme.ug.edu.gh/past.exampapers/index.php").unwrap();
        assert_eq!(origin, "https://balme.ug.edu.gh");
    }

    #[test]
    fn origin_keeps_explicit_port() {
        let origin = origin_of("http://localhost:8080/login").unwrap();
        assert_eq!(origin, "http://localhost:8080");
    }

    #[test]
    fn origin_rejects_garbage() {
        assert!(origin_of("not a url").is_err());
    }
}
