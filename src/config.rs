use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use crate::client::ClientConfig;
use crate::records::NumberFormat;
use crate::sink::CsvOptions;
use crate::store::FileCredentialStore;
use crate::util::strip_quotes;
use crate::{eloverblik, emissions};

/// Values given on the command line. They win over env vars and `.elsyncrc`.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub emissions_url: Option<String>,
    pub token: Option<String>,
    pub token_cache: Option<PathBuf>,
    pub decimal_separator: Option<char>,
    pub delimiter: Option<char>,
    pub verify: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the eloverblik customer API.
    pub url: String,
    /// Emission dataset URL.
    pub emissions_url: String,
    /// Long-lived refresh token from eloverblik.dk. Only needed for usage,
    /// charges and listing.
    pub token: Option<String>,
    /// Where the data access token is cached.
    pub token_cache: PathBuf,
    pub decimal_separator: char,
    pub delimiter: char,
    /// Whether to verify TLS certificates.
    pub verify: bool,
    /// Places a `.elsyncrc` was looked for, for error messages.
    pub searched: Vec<PathBuf>,
}

impl Config {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            verify: self.verify,
            ..ClientConfig::new(self.url.clone())
        }
    }

    pub fn emissions_client_config(&self) -> ClientConfig {
        ClientConfig {
            verify: self.verify,
            ..ClientConfig::new(self.emissions_url.clone())
        }
    }

    pub fn csv_options(&self) -> CsvOptions {
        CsvOptions {
            delimiter: self.delimiter as u8,
            format: NumberFormat::new(self.decimal_separator),
        }
    }

    pub fn credential_store(&self) -> FileCredentialStore {
        FileCredentialStore::new(&self.token_cache)
    }

    /// The refresh token, or an error naming every place it was looked for.
    pub fn require_token(&self) -> Result<&str> {
        match self.token.as_deref() {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => {
                if !self.searched.is_empty() {
                    bail!(
                        "Missing configuration: token (pass --token, set ELSYNC_TOKEN or put `token:` in one of: {})",
                        self.searched
                            .iter()
                            .map(|p| p.display().to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
                bail!("Missing configuration: token (pass --token, set ELSYNC_TOKEN or create .elsyncrc)");
            }
        }
    }
}

#[derive(Debug, Default)]
struct RcConfig {
    url: Option<String>,
    emissions_url: Option<String>,
    token: Option<String>,
    token_cache: Option<String>,
    decimal_separator: Option<String>,
    delimiter: Option<String>,
    verify: Option<bool>,
}

/// Resolves configuration from (in order) `overrides`, `ELSYNC_*` environment
/// variables and the first `.elsyncrc` found.
pub fn load_config(overrides: Overrides) -> Result<Config> {
    load_config_from(overrides, |name| std::env::var(name).ok(), rc_candidates())
}

fn load_config_from(
    overrides: Overrides,
    env: impl Fn(&str) -> Option<String>,
    rc_candidates: Vec<PathBuf>,
) -> Result<Config> {
    let mut rc = RcConfig::default();
    for rc_path in &rc_candidates {
        if rc_path.exists() {
            rc = read_rc(rc_path).with_context(|| {
                format!("failed to read configuration file {}", rc_path.display())
            })?;
            break;
        }
    }

    let url = overrides
        .url
        .or_else(|| env("ELSYNC_URL"))
        .or(rc.url)
        .unwrap_or_else(|| eloverblik::DEFAULT_URL.to_string());
    let emissions_url = overrides
        .emissions_url
        .or_else(|| env("ELSYNC_EMISSIONS_URL"))
        .or(rc.emissions_url)
        .unwrap_or_else(|| emissions::DEFAULT_URL.to_string());
    let token = overrides
        .token
        .or_else(|| env("ELSYNC_TOKEN"))
        .or(rc.token)
        .map(|t| t.trim().to_string());
    let token_cache = overrides
        .token_cache
        .or_else(|| env("ELSYNC_TOKEN_CACHE").map(PathBuf::from))
        .or(rc.token_cache.map(PathBuf::from))
        .unwrap_or_else(FileCredentialStore::default_path);

    let decimal_separator = match overrides.decimal_separator {
        Some(c) => c,
        None => match rc.decimal_separator.as_deref() {
            Some(s) => single_char("decimal_separator", s)?,
            None => '.',
        },
    };
    // Spreadsheets that read decimal commas expect semicolon separated files.
    let default_delimiter = if decimal_separator == ',' { ';' } else { ',' };
    let delimiter = match overrides.delimiter {
        Some(c) => c,
        None => match rc.delimiter.as_deref() {
            Some(s) => single_char("delimiter", s)?,
            None => default_delimiter,
        },
    };
    if !delimiter.is_ascii() {
        bail!("delimiter must be a single ASCII character, got '{}'", delimiter);
    }
    if delimiter == decimal_separator {
        bail!(
            "delimiter and decimal separator cannot both be '{}'",
            delimiter
        );
    }

    let verify = overrides.verify.or(rc.verify).unwrap_or(true);

    Ok(Config {
        url,
        emissions_url,
        token,
        token_cache,
        decimal_separator,
        delimiter,
        verify,
        searched: rc_candidates,
    })
}

fn single_char(key: &str, value: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => bail!("`{}` must be a single character, got '{}'", key, value),
    }
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    let mut cfg = RcConfig::default();

    // Support formatting where `token:` is on one line and the token is on the next line.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            // Continuation value line; URLs carry their own ':'.
            if !starts_with_key(line) {
                set_rc_value(&mut cfg, pk, strip_quotes(line));
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            // Quoted values may themselves contain ':' (URLs, '":"'), keep them whole.
            let v = strip_quotes(v.trim());
            match k {
                "url" | "emissions_url" | "token" | "token_cache" => {
                    if v.is_empty() {
                        pending_key = Some(match k {
                            "url" => "url",
                            "emissions_url" => "emissions_url",
                            "token" => "token",
                            _ => "token_cache",
                        });
                    } else {
                        set_rc_value(&mut cfg, k, v);
                    }
                }
                "decimal_separator" | "delimiter" | "verify" => {
                    if !v.is_empty() {
                        set_rc_value(&mut cfg, k, v);
                    }
                }
                _ => {}
            }
        }
    }

    Ok(cfg)
}

const RC_KEYS: [&str; 7] = [
    "url",
    "emissions_url",
    "token",
    "token_cache",
    "decimal_separator",
    "delimiter",
    "verify",
];

fn starts_with_key(line: &str) -> bool {
    line.split_once(':')
        .is_some_and(|(k, _)| RC_KEYS.contains(&k.trim()))
}

fn set_rc_value(cfg: &mut RcConfig, key: &str, value: &str) {
    let value = value.to_string();
    match key {
        "url" => cfg.url = Some(value),
        "emissions_url" => cfg.emissions_url = Some(value),
        "token" => cfg.token = Some(value),
        "token_cache" => cfg.token_cache = Some(value),
        "decimal_separator" => cfg.decimal_separator = Some(value),
        "delimiter" => cfg.delimiter = Some(value),
        "verify" => cfg.verify = Some(value != "0" && !value.eq_ignore_ascii_case("false")),
        _ => {}
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) ELSYNC_RC (explicit)
    // 2) ./.elsyncrc
    // 3) ~/.elsyncrc
    if let Ok(p) = std::env::var("ELSYNC_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".elsyncrc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".elsyncrc"));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_rc(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join(".elsyncrc");
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn defaults_without_any_source() {
        let cfg = load_config_from(Overrides::default(), no_env, vec![]).unwrap();
        assert_eq!(cfg.url, eloverblik::DEFAULT_URL);
        assert_eq!(cfg.emissions_url, emissions::DEFAULT_URL);
        assert_eq!(cfg.decimal_separator, '.');
        assert_eq!(cfg.delimiter, ',');
        assert!(cfg.verify);
        assert!(cfg.require_token().is_err());
    }

    #[test]
    fn rc_file_values_and_continuation_lines() {
        let dir = tempfile::tempdir().unwrap();
        let rc = write_rc(
            dir.path(),
            "# eloverblik\nurl: https://example.test/api/\ntoken:\n  \"eyJhbGciOi.refresh\"\ndecimal_separator: ,\nverify: 0\n",
        );

        let cfg = load_config_from(Overrides::default(), no_env, vec![rc]).unwrap();
        assert_eq!(cfg.url, "https://example.test/api/");
        assert_eq!(cfg.require_token().unwrap(), "eyJhbGciOi.refresh");
        assert_eq!(cfg.decimal_separator, ',');
        assert_eq!(cfg.delimiter, ';');
        assert!(!cfg.verify);
    }

    #[test]
    fn url_on_the_line_after_its_key() {
        let dir = tempfile::tempdir().unwrap();
        let rc = write_rc(
            dir.path(),
            "url:\n  https://mirror.test/CustomerApi/api/\nemissions_url:\n\"https://mirror.test/dataset/DeclarationEmissionHour\"\ntoken:\ndelimiter: |\n",
        );

        let cfg = load_config_from(Overrides::default(), no_env, vec![rc]).unwrap();
        assert_eq!(cfg.url, "https://mirror.test/CustomerApi/api/");
        assert_eq!(
            cfg.emissions_url,
            "https://mirror.test/dataset/DeclarationEmissionHour"
        );
        // `delimiter:` is a key of its own, not the token.
        assert_eq!(cfg.token, None);
        assert_eq!(cfg.delimiter, '|');
    }

    #[test]
    fn precedence_is_override_then_env_then_rc() {
        let dir = tempfile::tempdir().unwrap();
        let rc = write_rc(dir.path(), "token: from-rc\nurl: https://rc.test/\n");
        let env: HashMap<&str, &str> = [("ELSYNC_TOKEN", "from-env")].into();
        let env = |name: &str| env.get(name).map(|v| v.to_string());

        let cfg = load_config_from(Overrides::default(), env, vec![rc.clone()]).unwrap();
        assert_eq!(cfg.token.as_deref(), Some("from-env"));
        assert_eq!(cfg.url, "https://rc.test/");

        let overrides = Overrides {
            token: Some("from-cli".to_string()),
            ..Overrides::default()
        };
        let cfg = load_config_from(overrides, env, vec![rc]).unwrap();
        assert_eq!(cfg.token.as_deref(), Some("from-cli"));
    }

    #[test]
    fn clashing_separators_are_rejected() {
        let overrides = Overrides {
            decimal_separator: Some(','),
            delimiter: Some(','),
            ..Overrides::default()
        };
        assert!(load_config_from(overrides, no_env, vec![]).is_err());
    }

    #[test]
    fn missing_token_error_lists_searched_files() {
        let cfg = load_config_from(
            Overrides::default(),
            no_env,
            vec![PathBuf::from("/nowhere/.elsyncrc")],
        )
        .unwrap();
        let msg = cfg.require_token().unwrap_err().to_string();
        assert!(msg.contains("/nowhere/.elsyncrc"));
    }
}
