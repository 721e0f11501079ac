//! Local device preferences: the restorable session and the push token.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use twinkle_shared::UserId;
use twinkle_store::User;

use crate::error::PreferencesError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub logged_in: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
}

/// Preferences backed by a JSON file, or held in memory only when no
/// path is given.
#[derive(Debug)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
    current: Preferences,
}

impl PreferenceStore {
    /// Read the file at `path`. A missing file yields defaults; an
    /// unreadable one is logged and replaced with defaults on next write.
    pub fn load(path: &Path) -> Result<Self, PreferencesError> {
        let current = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(prefs) => prefs,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "discarding malformed preferences");
                    Preferences::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Preferences::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            current,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: Preferences::default(),
        }
    }

    pub fn get(&self) -> &Preferences {
        &self.current
    }

    pub fn save_session(&mut self, user: &User, token: &str) -> Result<(), PreferencesError> {
        self.current.logged_in = true;
        self.current.user_id = Some(user.id.clone());
        self.current.email = Some(user.email.clone());
        self.current.name = Some(user.display_name.clone());
        self.current.session_token = Some(token.to_string());
        self.persist()
    }

    /// Forget the session. The push token goes too: it is re-registered
    /// on the next sign-in.
    pub fn clear_session(&mut self) -> Result<(), PreferencesError> {
        self.current = Preferences::default();
        self.persist()
    }

    pub fn set_push_token(&mut self, token: &str) -> Result<(), PreferencesError> {
        self.current.push_token = Some(token.to_string());
        self.persist()
    }

    fn persist(&self) -> Result<(), PreferencesError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&self.current)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> User {
        User::new(UserId::parse("alice").unwrap(), "alice@example.com", "Alice")
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::load(&dir.path().join("prefs.json")).unwrap();
        assert_eq!(store.get(), &Preferences::default());
    }

    #[test]
    fn test_session_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        let mut store = PreferenceStore::load(&path).unwrap();
        store.save_session(&alice(), "tok").unwrap();
        store.set_push_token("device-1").unwrap();

        let reloaded = PreferenceStore::load(&path).unwrap();
        let prefs = reloaded.get();
        assert!(prefs.logged_in);
        assert_eq!(prefs.user_id.as_ref().map(|u| u.as_str()), Some("alice"));
        assert_eq!(prefs.name.as_deref(), Some("Alice"));
        assert_eq!(prefs.session_token.as_deref(), Some("tok"));
        assert_eq!(prefs.push_token.as_deref(), Some("device-1"));
    }

    #[test]
    fn test_clear_session_drops_push_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let mut store = PreferenceStore::load(&path).unwrap();
        store.save_session(&alice(), "tok").unwrap();
        store.set_push_token("device-1").unwrap();

        store.clear_session().unwrap();
        assert_eq!(PreferenceStore::load(&path).unwrap().get(), &Preferences::default());
    }

    #[test]
    fn test_malformed_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let store = PreferenceStore::load(&path).unwrap();
        assert!(!store.get().logged_in);
    }

    #[test]
    fn test_wire_field_names() {
        let mut store = PreferenceStore::in_memory();
        store.save_session(&alice(), "tok").unwrap();
        let json = serde_json::to_value(store.get()).unwrap();
        assert_eq!(json["loggedIn"], true);
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["sessionToken"], "tok");
    }
}
