//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment: `WKX_*` environment variables, optionally layered
//! under a TOML file. Three sections, all optional:
//!
//! ```toml
//! [analytics]            # where the analytics server lives and how to talk to it
//! request_address = "https://stats.example.com/"
//! site_id = "1"
//! auth_token = "..."
//!
//! [wiki]                 # how report labels map back to wiki pages
//! base_url = "https://wiki.example.com/"
//! default_wiki = "xwiki"
//!
//! [permissions]          # see permissions::AccessRules
//! guest_deny = ["xwiki:Admin."]
//! ```

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use tracing::info;

use crate::permissions::AccessRules;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub wiki: WikiConfig,
    #[serde(default)]
    pub permissions: AccessRules,
}

/// 📡 The three strings the analytics server needs from us. Every one of them
/// defaults to empty, because an unset setting is an empty setting.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AnalyticsConfig {
    #[serde(default, deserialize_with = "loose_string")]
    pub request_address: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub site_id: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub auth_token: String,
}

// 🔢 `WKX_ANALYTICS__SITE_ID=1` arrives from figment as the number 1, not "1".
// Site ids and tokens are text to us, whatever they look like.
fn loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Text(String),
        Signed(i64),
        Unsigned(u64),
        Float(f64),
        Flag(bool),
    }

    Ok(match Loose::deserialize(deserializer)? {
        Loose::Text(text) => text,
        Loose::Signed(n) => n.to_string(),
        Loose::Unsigned(n) => n.to_string(),
        Loose::Float(n) => n.to_string(),
        Loose::Flag(flag) => flag.to_string(),
    })
}

/// 🗺️ Where the wiki lives, so relative report labels can be anchored.
#[derive(Debug, Deserialize, Clone)]
pub struct WikiConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_wiki")]
    pub default_wiki: String,
}

fn default_wiki() -> String {
    "xwiki".to_string()
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_wiki: default_wiki(),
        }
    }
}

/// 🔌 Read-only view of the analytics settings. Hosts with their own settings
/// store implement this; standalone, [`AnalyticsConfig`] does.
pub trait ConfigurationProvider: Send + Sync {
    fn request_address(&self) -> &str;
    fn site_id(&self) -> &str;
    fn auth_token(&self) -> &str;
}

impl ConfigurationProvider for AnalyticsConfig {
    fn request_address(&self) -> &str {
        &self.request_address
    }

    fn site_id(&self) -> &str {
        &self.site_id
    }

    fn auth_token(&self) -> &str {
        &self.auth_token
    }
}

/// 🚀 Load the config — from env vars, and from a TOML file if one is given.
///
/// 📐 DESIGN NOTE:
///   - `config_file_name` None → env vars only (`WKX_ANALYTICS__SITE_ID=1` style, `__` nests).
///   - `config_file_name` Some → env vars + TOML file, merged. TOML wins on conflicts.
///
/// 💀 Returns an error if the config is unparseable, with a message that says where we looked.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("WKX_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (WKX_*). \
             The file exists in our hearts, but apparently not in a shape serde likes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (WKX_*). \
                 No file was provided — this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_config(contents: &str) -> tempfile::NamedTempFile {
        let mut the_file = tempfile::Builder::new()
            .prefix("wkx_app_config_")
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create a temp config. The filesystem said 'new phone who dis'.");
        the_file
            .write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        the_file
    }

    #[test]
    fn the_one_where_every_section_shows_up() {
        let the_file = write_test_config(
            r#"
            [analytics]
            request_address = "https://stats.example.com/"
            site_id = "7"
            auth_token = "s3cr3t"

            [wiki]
            base_url = "https://wiki.example.com/"
            default_wiki = "xwiki"

            [permissions]
            guest_deny = ["xwiki:Admin."]

            [permissions.deny]
            alice = ["xwiki:HR."]
            "#,
        );

        let app_config = load_config(Some(the_file.path()))
            .expect("💀 Full config should parse. The schema drift goblin does not get this win.");

        assert_eq!(app_config.analytics.request_address(), "https://stats.example.com/");
        assert_eq!(app_config.analytics.site_id(), "7");
        assert_eq!(app_config.analytics.auth_token(), "s3cr3t");
        assert_eq!(app_config.wiki.base_url.as_deref(), Some("https://wiki.example.com/"));
        assert_eq!(app_config.wiki.default_wiki, "xwiki");
        assert_eq!(app_config.permissions.guest_deny, vec!["xwiki:Admin.".to_string()]);
        assert_eq!(app_config.permissions.deny["alice"], vec!["xwiki:HR.".to_string()]);
    }

    #[test]
    fn the_one_where_unset_settings_are_empty_strings() {
        let the_file = write_test_config(
            r#"
            [analytics]
            site_id = "3"
            "#,
        );

        let app_config: AppConfig = Figment::new()
            .merge(Toml::file(the_file.path()))
            .extract()
            .expect("💀 Sparse config should parse. Serde left us on read otherwise.");

        assert_eq!(app_config.analytics.site_id(), "3");
        assert_eq!(app_config.analytics.request_address(), "");
        assert_eq!(app_config.analytics.auth_token(), "");
        assert!(app_config.wiki.base_url.is_none());
        assert!(app_config.permissions.guest_deny.is_empty());
    }

    #[test]
    fn the_one_where_env_vars_fill_in_the_blanks() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("WKX_ANALYTICS__SITE_ID", "42");
            jail.set_env("WKX_WIKI__DEFAULT_WIKI", "intranet");

            let app_config = load_config(None).map_err(|err| figment::Error::from(err.to_string()))?;
            assert_eq!(app_config.analytics.site_id(), "42");
            assert_eq!(app_config.wiki.default_wiki, "intranet");
            Ok(())
        });
    }

    #[test]
    fn the_one_where_a_broken_file_says_where_it_looked() {
        let the_file = write_test_config("[analytics]\nsite_id = [\"not\", \"a\", \"string\"]\n");
        let the_err = load_config(Some(the_file.path())).expect_err("💀 A list is not a site id");
        assert!(the_err.to_string().contains(&the_file.path().display().to_string()));
    }
}
