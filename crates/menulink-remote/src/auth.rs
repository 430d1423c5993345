//! Device-side authentication policies.
//!
//! An authenticator decides whether a (name, uuid) pair presented in a
//! join may open a session, and stores pairs registered through the
//! pairing flow. All implementations are safe for concurrent
//! authenticate/add calls from multiple connector threads.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Validates identities and stores pairing registrations.
pub trait Authenticator: Send + Sync {
    /// Whether the (name, uuid) pair may open a session.
    fn authenticate(&self, name: &str, uuid: &Uuid) -> bool;

    /// Register a pair, replacing any token already held for the name.
    ///
    /// Returns true when the pair was stored, false when this policy does
    /// not accept registrations.
    fn add_authentication(&self, name: &str, uuid: &Uuid) -> io::Result<bool>;

    /// Whether the management passcode matches.
    fn passcode_matches(&self, passcode: &str) -> bool;
}

/// Accepts everything. For development setups with no trust store.
#[derive(Default)]
pub struct AlwaysAllowAuthenticator {
    passcode: Option<String>,
}

impl AlwaysAllowAuthenticator {
    /// Create an authenticator that accepts every identity and passcode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a management passcode while still accepting every identity.
    pub fn with_passcode(passcode: impl Into<String>) -> Self {
        AlwaysAllowAuthenticator {
            passcode: Some(passcode.into()),
        }
    }
}

impl Authenticator for AlwaysAllowAuthenticator {
    fn authenticate(&self, _name: &str, _uuid: &Uuid) -> bool {
        true
    }

    fn add_authentication(&self, _name: &str, _uuid: &Uuid) -> io::Result<bool> {
        Ok(true)
    }

    fn passcode_matches(&self, passcode: &str) -> bool {
        match &self.passcode {
            Some(expected) => expected == passcode,
            None => true,
        }
    }
}

/// A fixed allow-list, immutable after construction. Registrations are
/// refused.
pub struct PreDefinedAuthenticator {
    tokens: HashMap<String, Uuid>,
    passcode: Option<String>,
}

impl PreDefinedAuthenticator {
    /// Create from a list of (name, uuid) pairs.
    pub fn new(pairs: impl IntoIterator<Item = (String, Uuid)>) -> Self {
        PreDefinedAuthenticator {
            tokens: pairs.into_iter().collect(),
            passcode: None,
        }
    }

    /// Set the management passcode.
    pub fn with_passcode(mut self, passcode: impl Into<String>) -> Self {
        self.passcode = Some(passcode.into());
        self
    }
}

impl Authenticator for PreDefinedAuthenticator {
    fn authenticate(&self, name: &str, uuid: &Uuid) -> bool {
        self.tokens.get(name) == Some(uuid)
    }

    fn add_authentication(&self, name: &str, _uuid: &Uuid) -> io::Result<bool> {
        warn!(%name, "pre-defined authenticator refuses registrations");
        Ok(false)
    }

    fn passcode_matches(&self, passcode: &str) -> bool {
        match &self.passcode {
            Some(expected) => expected == passcode,
            None => true,
        }
    }
}

/// A persisted trust store backed by a flat `name=uuid` key-value file.
///
/// The file is plaintext and protected only by filesystem permissions;
/// this is a deliberately low-security store for devices that trust their
/// host. Lines starting with `#` and blank lines are ignored; a line with
/// an unparseable uuid is skipped with a warning rather than failing the
/// load. Writes go to a temporary file first and rename over the original.
pub struct FileAuthenticator {
    path: PathBuf,
    tokens: Mutex<HashMap<String, Uuid>>,
    passcode: Option<String>,
}

impl FileAuthenticator {
    /// Load the store, starting empty when the file does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut tokens = HashMap::new();

        match fs::read_to_string(&path) {
            Ok(contents) => {
                for line in contents.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    match line.split_once('=') {
                        Some((name, raw_uuid)) => match Uuid::parse_str(raw_uuid.trim()) {
                            Ok(uuid) => {
                                tokens.insert(name.trim().to_string(), uuid);
                            }
                            Err(_) => {
                                warn!(path = %path.display(), line, "skipping entry with invalid uuid");
                            }
                        },
                        None => {
                            warn!(path = %path.display(), line, "skipping malformed entry");
                        }
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        Ok(FileAuthenticator {
            path,
            tokens: Mutex::new(tokens),
            passcode: None,
        })
    }

    /// Set the management passcode.
    pub fn with_passcode(mut self, passcode: impl Into<String>) -> Self {
        self.passcode = Some(passcode.into());
        self
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored tokens.
    pub fn token_count(&self) -> usize {
        self.tokens.lock().len()
    }

    /// Rewrite the backing file from the given snapshot; called with the
    /// token mutex held so concurrent adds serialize.
    fn persist(&self, tokens: &HashMap<String, Uuid>) -> io::Result<()> {
        let mut contents = String::from("# menulink paired identities\n");
        let mut entries: Vec<(&String, &Uuid)> = tokens.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (name, uuid) in entries {
            contents.push_str(name);
            contents.push('=');
            contents.push_str(&uuid.to_string());
            contents.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)
    }
}

impl Authenticator for FileAuthenticator {
    fn authenticate(&self, name: &str, uuid: &Uuid) -> bool {
        self.tokens.lock().get(name) == Some(uuid)
    }

    fn add_authentication(&self, name: &str, uuid: &Uuid) -> io::Result<bool> {
        if name.contains('=') || name.contains('\n') || name.contains('\r') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "name contains characters reserved by the store format",
            ));
        }

        let mut tokens = self.tokens.lock();
        let replaced = tokens.insert(name.to_string(), *uuid).is_some();
        self.persist(&tokens)?;
        info!(%name, replaced, "identity stored");
        Ok(true)
    }

    fn passcode_matches(&self, passcode: &str) -> bool {
        match &self.passcode {
            Some(expected) => expected == passcode,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_store(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("menulink-auth-{}-{}", name, std::process::id()));
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn test_always_allow() {
        let auth = AlwaysAllowAuthenticator::new();
        assert!(auth.authenticate("anyone", &Uuid::new_v4()));
        assert!(auth.passcode_matches("anything"));
        assert!(auth.add_authentication("anyone", &Uuid::new_v4()).unwrap());
    }

    #[test]
    fn test_always_allow_with_passcode() {
        let auth = AlwaysAllowAuthenticator::with_passcode("1234");
        assert!(auth.passcode_matches("1234"));
        assert!(!auth.passcode_matches("4321"));
    }

    #[test]
    fn test_predefined_allow_list() {
        let uuid = Uuid::new_v4();
        let auth = PreDefinedAuthenticator::new(vec![("Tester".to_string(), uuid)]);
        assert!(auth.authenticate("Tester", &uuid));
        assert!(!auth.authenticate("Tester", &Uuid::new_v4()));
        assert!(!auth.authenticate("Imposter", &uuid));
        // immutable: adds are refused but not an error
        assert!(!auth.add_authentication("New", &Uuid::new_v4()).unwrap());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let path = temp_store("roundtrip");
        let uuid = Uuid::new_v4();

        let auth = FileAuthenticator::load(&path).unwrap();
        assert_eq!(auth.token_count(), 0);
        assert!(auth.add_authentication("Tester", &uuid).unwrap());
        assert!(auth.authenticate("Tester", &uuid));

        // a fresh load sees the persisted entry
        let reloaded = FileAuthenticator::load(&path).unwrap();
        assert_eq!(reloaded.token_count(), 1);
        assert!(reloaded.authenticate("Tester", &uuid));
        assert!(!reloaded.authenticate("Tester", &Uuid::new_v4()));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_file_store_replaces_same_name() {
        let path = temp_store("replace");
        let auth = FileAuthenticator::load(&path).unwrap();

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        auth.add_authentication("Tester", &first).unwrap();
        auth.add_authentication("Tester", &second).unwrap();

        assert_eq!(auth.token_count(), 1);
        assert!(!auth.authenticate("Tester", &first));
        assert!(auth.authenticate("Tester", &second));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_file_store_rejects_reserved_characters() {
        let path = temp_store("reserved");
        let auth = FileAuthenticator::load(&path).unwrap();
        assert!(auth.add_authentication("a=b", &Uuid::new_v4()).is_err());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_file_store_skips_bad_lines() {
        let path = temp_store("badlines");
        fs::write(
            &path,
            "# comment\n\nTester=not-a-uuid\nGood=6ec72f69-e9d6-4f2a-a24a-74f2a0493e30\njunk line\n",
        )
        .unwrap();

        let auth = FileAuthenticator::load(&path).unwrap();
        assert_eq!(auth.token_count(), 1);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_concurrent_adds_and_checks() {
        let path = temp_store("concurrent");
        let auth = Arc::new(FileAuthenticator::load(&path).unwrap());

        let mut handles = Vec::new();
        for i in 0..4 {
            let auth = Arc::clone(&auth);
            handles.push(std::thread::spawn(move || {
                for j in 0..10 {
                    let uuid = Uuid::new_v4();
                    let name = format!("user-{}-{}", i, j);
                    auth.add_authentication(&name, &uuid).unwrap();
                    assert!(auth.authenticate(&name, &uuid));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(auth.token_count(), 40);

        let _ = fs::remove_file(&path);
    }
}
