use tracing::warn;

use crate::conn::BoxedConn;

/// One successful authentication, kept for replay
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub database: String,
    pub username: String,
    pub secret: String,
    pub digest: bool,
}

/// Append-only credential cache scoped to one routing client
///
/// Replay order equals insertion order; there is no deduplication and no
/// removal. Every new physical connection is replayed the full cache
/// before the first user operation flows through it.
#[derive(Debug, Default)]
pub struct CredentialCache {
    records: Vec<CredentialRecord>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: CredentialRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CredentialRecord> {
        self.records.iter()
    }

    /// Apply every cached credential to a freshly opened connection.
    /// A credential that fails to apply is logged and skipped; the
    /// connection is still handed to the caller.
    pub(crate) async fn replay(&self, conn: &mut BoxedConn, set: &str) {
        for cred in &self.records {
            if let Err(error) = conn
                .auth(&cred.database, &cred.username, &cred.secret, cred.digest)
                .await
            {
                warn!(
                    set = %set,
                    db = %cred.database,
                    user = %cred.username,
                    %error,
                    "cached credential replay failed"
                );
            }
        }
    }
}
