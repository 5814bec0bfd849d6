use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::state::ensure_smartdo_home;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AuthState {
    pub openai_api_key: Option<String>,
}

fn auth_path() -> Result<PathBuf> {
    Ok(ensure_smartdo_home()?.join("auth.json"))
}

pub fn load_auth() -> Result<AuthState> {
    load_auth_from(&auth_path()?)
}

fn load_auth_from(p: &Path) -> Result<AuthState> {
    if !p.exists() {
        return Ok(AuthState::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

fn save_auth_to(auth: &AuthState, p: &Path) -> Result<()> {
    let s = serde_json::to_string_pretty(auth)?;
    fs::write(p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

/// The environment wins over auth.json.
pub fn resolve_api_key() -> Result<Option<String>> {
    let from_env = std::env::var(API_KEY_ENV).ok();
    Ok(pick_key(from_env, load_auth()?))
}

fn pick_key(from_env: Option<String>, auth: AuthState) -> Option<String> {
    from_env
        .filter(|k| !k.trim().is_empty())
        .or(auth.openai_api_key)
        .filter(|k| !k.trim().is_empty())
}

fn prompt_secret(label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

pub fn openai_paste_api_key() -> Result<()> {
    let p = auth_path()?;
    let mut auth = load_auth_from(&p)?;
    let key = prompt_secret("Paste OpenAI API key (starts with sk-)")?;
    if !key.starts_with("sk-") {
        bail!("key didn't look like an OpenAI API key (expected prefix sk-)");
    }
    auth.openai_api_key = Some(key);
    save_auth_to(&auth, &p)?;
    println!("Saved OpenAI API key to {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_key_beats_file_and_blank_is_ignored() {
        let file = AuthState {
            openai_api_key: Some("sk-file".into()),
        };
        assert_eq!(pick_key(Some("sk-env".into()), file.clone()).as_deref(), Some("sk-env"));
        assert_eq!(pick_key(Some("  ".into()), file.clone()).as_deref(), Some("sk-file"));
        assert_eq!(pick_key(None, AuthState::default()), None);
    }

    #[test]
    fn auth_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("auth.json");
        assert_eq!(load_auth_from(&p).unwrap(), AuthState::default());

        let auth = AuthState {
            openai_api_key: Some("sk-test".into()),
        };
        save_auth_to(&auth, &p).unwrap();
        assert_eq!(load_auth_from(&p).unwrap(), auth);
    }
}
