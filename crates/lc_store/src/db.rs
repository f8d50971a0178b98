//! Encrypted SQLite record store via sqlx.

use std::path::Path;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use zeroize::Zeroizing;

use lc_crypto::{aead, kdf};

use crate::error::StoreError;
use crate::migrations::run_migrations;
use crate::models::{AccountRecord, ContactRecord, ContactStatus, SeenHandshake};
use crate::record::RecordStore;
use crate::vault::Vault;

const META_SALT: &str = "vault_salt";
const META_CHECK: &str = "vault_check";
const VAULT_CHECK_PLAINTEXT: &[u8] = b"lattice-contact-vault-v1";

/// Store handle. Cheap to clone (the pool and vault are shared).
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    vault: Vault,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and apply the schema.
    /// The store starts locked.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;
        run_migrations(&pool).await?;
        tracing::debug!(path = %db_path.display(), "[store] database opened");

        Ok(Self { pool, vault: Vault::new() })
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// Unlock with the user's passphrase. The first unlock creates the salt
    /// and a check value; later unlocks must reproduce the same key.
    pub async fn unlock(&self, passphrase: &[u8]) -> Result<(), StoreError> {
        let salt = match self.meta_get(META_SALT).await? {
            Some(hex_salt) => {
                let bytes = hex::decode(&hex_salt).map_err(|e| StoreError::Corrupt(e.to_string()))?;
                <[u8; kdf::SALT_LEN]>::try_from(bytes.as_slice())
                    .map_err(|_| StoreError::Corrupt("vault salt length".into()))?
            }
            None => {
                let salt = kdf::generate_salt();
                self.meta_put(META_SALT, &hex::encode(salt)).await?;
                salt
            }
        };

        self.vault.unlock(passphrase, &salt).await?;

        match self.meta_get(META_CHECK).await? {
            Some(check) => {
                if self.decrypt_value(&check, META_CHECK.as_bytes()).await.is_err() {
                    self.vault.lock().await;
                    tracing::warn!("[store] unlock rejected: passphrase mismatch");
                    return Err(StoreError::WrongPassphrase);
                }
            }
            None => {
                let check = self.encrypt_value(VAULT_CHECK_PLAINTEXT, META_CHECK.as_bytes()).await?;
                self.meta_put(META_CHECK, &check).await?;
            }
        }
        tracing::info!("[store] vault unlocked");
        Ok(())
    }

    pub async fn lock(&self) {
        self.vault.lock().await;
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    async fn meta_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(sqlx::query_scalar("SELECT value FROM meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn meta_put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Encrypt with the vault key; `aad` binds the ciphertext to its column and row.
    async fn encrypt_value(&self, plaintext: &[u8], aad: &[u8]) -> Result<String, StoreError> {
        self.vault
            .with_key(|key| {
                let ct = aead::encrypt(key, plaintext, aad)?;
                Ok(URL_SAFE_NO_PAD.encode(ct))
            })
            .await
    }

    async fn decrypt_value(&self, b64: &str, aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, StoreError> {
        let ct = URL_SAFE_NO_PAD
            .decode(b64)
            .map_err(|e| StoreError::Crypto(lc_crypto::CryptoError::Base64Decode(e)))?;
        self.vault
            .with_key(|key| Ok(aead::decrypt(key, &ct, aad)?))
            .await
    }
}

fn account_aad(account_id: &str) -> Vec<u8> {
    format!("accounts.signature_private_key:{account_id}").into_bytes()
}

fn contact_aad(contact_id: &str) -> Vec<u8> {
    format!("contacts.own_kem_secret_key:{contact_id}").into_bytes()
}

fn map_insert_err(key: &str, e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(key.to_string()),
        _ => StoreError::Database(e),
    }
}

// ── Accounts ─────────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct AccountRow {
    account_id: String,
    username: String,
    first_name: Option<String>,
    last_name: Option<String>,
    bio: Option<String>,
    avatar_url: String,
    signature_public_key: Vec<u8>,
    signature_private_key_enc: String,
    version: i64,
}

impl SqliteStore {
    async fn account_from_row(&self, row: AccountRow) -> Result<AccountRecord, StoreError> {
        let signature_private_key = self
            .decrypt_value(&row.signature_private_key_enc, &account_aad(&row.account_id))
            .await?;
        Ok(AccountRecord {
            account_id: row.account_id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            bio: row.bio,
            avatar_url: row.avatar_url,
            signature_public_key: row.signature_public_key,
            signature_private_key,
            version: row.version,
        })
    }
}

#[async_trait]
impl RecordStore<AccountRecord> for SqliteStore {
    async fn save(&self, a: &AccountRecord) -> Result<(), StoreError> {
        let secret = self
            .encrypt_value(&a.signature_private_key, &account_aad(&a.account_id))
            .await?;
        sqlx::query(
            "INSERT INTO accounts (account_id, username, first_name, last_name, bio, avatar_url, signature_public_key, signature_private_key_enc, version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&a.account_id)
        .bind(&a.username)
        .bind(&a.first_name)
        .bind(&a.last_name)
        .bind(&a.bio)
        .bind(&a.avatar_url)
        .bind(&a.signature_public_key)
        .bind(secret)
        .bind(a.version)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(&a.account_id, e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<AccountRecord>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as("SELECT * FROM accounts WHERE account_id = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.account_from_row(row).await?)),
            None => Ok(None),
        }
    }

    async fn update(&self, a: &AccountRecord) -> Result<(), StoreError> {
        let secret = self
            .encrypt_value(&a.signature_private_key, &account_aad(&a.account_id))
            .await?;
        let done = sqlx::query(
            "UPDATE accounts SET username = ?, first_name = ?, last_name = ?, bio = ?, avatar_url = ?,
                signature_public_key = ?, signature_private_key_enc = ?, version = ?
             WHERE account_id = ?",
        )
        .bind(&a.username)
        .bind(&a.first_name)
        .bind(&a.last_name)
        .bind(&a.bio)
        .bind(&a.avatar_url)
        .bind(&a.signature_public_key)
        .bind(secret)
        .bind(a.version)
        .bind(&a.account_id)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(a.account_id.clone()));
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<AccountRecord>, StoreError> {
        let rows: Vec<AccountRow> = sqlx::query_as("SELECT * FROM accounts ORDER BY account_id")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.account_from_row(row).await?);
        }
        Ok(out)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let done = sqlx::query("DELETE FROM accounts WHERE account_id = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(())
    }
}

// ── Contacts ─────────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct ContactRow {
    contact_id: String,
    username: String,
    first_name: Option<String>,
    last_name: Option<String>,
    bio: Option<String>,
    avatar_url: String,
    status: String,
    own_kem_public_key: Option<Vec<u8>>,
    own_kem_secret_key_enc: Option<String>,
    peer_signature_public_key: Option<Vec<u8>>,
    peer_kem_public_key: Option<Vec<u8>>,
    version: i64,
}

impl SqliteStore {
    async fn contact_from_row(&self, row: ContactRow) -> Result<ContactRecord, StoreError> {
        let status: ContactStatus = row.status.parse().map_err(StoreError::Corrupt)?;
        let own_kem_secret_key = match &row.own_kem_secret_key_enc {
            Some(enc) => Some(self.decrypt_value(enc, &contact_aad(&row.contact_id)).await?),
            None => None,
        };
        Ok(ContactRecord {
            contact_id: row.contact_id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            bio: row.bio,
            avatar_url: row.avatar_url,
            status,
            own_kem_public_key: row.own_kem_public_key,
            own_kem_secret_key,
            peer_signature_public_key: row.peer_signature_public_key,
            peer_kem_public_key: row.peer_kem_public_key,
            version: row.version,
        })
    }

    async fn sealed_kem_secret(&self, c: &ContactRecord) -> Result<Option<String>, StoreError> {
        match &c.own_kem_secret_key {
            Some(secret) => Ok(Some(self.encrypt_value(secret, &contact_aad(&c.contact_id)).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RecordStore<ContactRecord> for SqliteStore {
    async fn save(&self, c: &ContactRecord) -> Result<(), StoreError> {
        let secret = self.sealed_kem_secret(c).await?;
        sqlx::query(
            "INSERT INTO contacts (contact_id, username, first_name, last_name, bio, avatar_url, status,
                own_kem_public_key, own_kem_secret_key_enc, peer_signature_public_key, peer_kem_public_key, version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&c.contact_id)
        .bind(&c.username)
        .bind(&c.first_name)
        .bind(&c.last_name)
        .bind(&c.bio)
        .bind(&c.avatar_url)
        .bind(c.status.as_str())
        .bind(&c.own_kem_public_key)
        .bind(secret)
        .bind(&c.peer_signature_public_key)
        .bind(&c.peer_kem_public_key)
        .bind(c.version)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(&c.contact_id, e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ContactRecord>, StoreError> {
        let row: Option<ContactRow> = sqlx::query_as("SELECT * FROM contacts WHERE contact_id = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.contact_from_row(row).await?)),
            None => Ok(None),
        }
    }

    async fn update(&self, c: &ContactRecord) -> Result<(), StoreError> {
        let secret = self.sealed_kem_secret(c).await?;
        let done = sqlx::query(
            "UPDATE contacts SET username = ?, first_name = ?, last_name = ?, bio = ?, avatar_url = ?, status = ?,
                own_kem_public_key = ?, own_kem_secret_key_enc = ?, peer_signature_public_key = ?,
                peer_kem_public_key = ?, version = ?
             WHERE contact_id = ?",
        )
        .bind(&c.username)
        .bind(&c.first_name)
        .bind(&c.last_name)
        .bind(&c.bio)
        .bind(&c.avatar_url)
        .bind(c.status.as_str())
        .bind(&c.own_kem_public_key)
        .bind(secret)
        .bind(&c.peer_signature_public_key)
        .bind(&c.peer_kem_public_key)
        .bind(c.version)
        .bind(&c.contact_id)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(c.contact_id.clone()));
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<ContactRecord>, StoreError> {
        let rows: Vec<ContactRow> = sqlx::query_as("SELECT * FROM contacts ORDER BY contact_id")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.contact_from_row(row).await?);
        }
        Ok(out)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let done = sqlx::query("DELETE FROM contacts WHERE contact_id = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(())
    }
}

// ── Seen handshakes ──────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct SeenHandshakeRow {
    digest: String,
    contact_id: String,
    seen_at: i64,
}

impl From<SeenHandshakeRow> for SeenHandshake {
    fn from(row: SeenHandshakeRow) -> Self {
        Self { digest: row.digest, contact_id: row.contact_id, seen_at: row.seen_at }
    }
}

#[async_trait]
impl RecordStore<SeenHandshake> for SqliteStore {
    async fn save(&self, s: &SeenHandshake) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO seen_handshakes (digest, contact_id, seen_at) VALUES (?, ?, ?)")
            .bind(&s.digest)
            .bind(&s.contact_id)
            .bind(s.seen_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_err(&s.digest, e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SeenHandshake>, StoreError> {
        let row: Option<SeenHandshakeRow> =
            sqlx::query_as("SELECT * FROM seen_handshakes WHERE digest = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn update(&self, s: &SeenHandshake) -> Result<(), StoreError> {
        let done = sqlx::query("UPDATE seen_handshakes SET contact_id = ?, seen_at = ? WHERE digest = ?")
            .bind(&s.contact_id)
            .bind(s.seen_at)
            .bind(&s.digest)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(s.digest.clone()));
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<SeenHandshake>, StoreError> {
        let rows: Vec<SeenHandshakeRow> = sqlx::query_as("SELECT * FROM seen_handshakes ORDER BY digest")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let done = sqlx::query("DELETE FROM seen_handshakes WHERE digest = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountRecord {
        AccountRecord {
            account_id: "acc==".into(),
            username: "ada".into(),
            first_name: Some("Ada".into()),
            last_name: None,
            bio: None,
            avatar_url: String::new(),
            signature_public_key: vec![1; 16],
            signature_private_key: Zeroizing::new(b"very secret ml-dsa key".to_vec()),
            version: 0,
        }
    }

    fn contact(id: &str) -> ContactRecord {
        ContactRecord {
            contact_id: id.into(),
            username: format!("user-{id}"),
            first_name: None,
            last_name: None,
            bio: Some("hi".into()),
            avatar_url: "https://cdn.example/a.png".into(),
            status: ContactStatus::Pending,
            own_kem_public_key: Some(vec![5; 8]),
            own_kem_secret_key: Some(Zeroizing::new(b"kem secret".to_vec())),
            peer_signature_public_key: None,
            peer_kem_public_key: None,
            version: 2,
        }
    }

    #[tokio::test]
    async fn secrets_roundtrip_and_are_encrypted_at_rest() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("lc.db")).await.unwrap();
        store.unlock(b"passphrase").await.unwrap();

        RecordStore::<AccountRecord>::save(&store, &account()).await.unwrap();
        let loaded = RecordStore::<AccountRecord>::get(&store, "acc==").await.unwrap().unwrap();
        assert_eq!(loaded, account());

        let raw: String = sqlx::query_scalar("SELECT signature_private_key_enc FROM accounts")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert!(!raw.contains("secret"));

        store.lock().await;
        let locked = RecordStore::<AccountRecord>::get(&store, "acc==").await;
        assert!(matches!(locked, Err(StoreError::VaultLocked)));
    }

    #[tokio::test]
    async fn wrong_passphrase_is_rejected_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lc.db");
        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.unlock(b"right").await.unwrap();
        }
        let store = SqliteStore::open(&path).await.unwrap();
        assert!(matches!(store.unlock(b"wrong").await, Err(StoreError::WrongPassphrase)));
        assert!(store.vault().is_locked().await);
    }

    #[tokio::test]
    async fn contact_crud_follows_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("lc.db")).await.unwrap();
        store.vault().unlock_with_key([4u8; 32]).await;

        store.save(&contact("b")).await.unwrap();
        store.save(&contact("a")).await.unwrap();
        assert!(matches!(store.save(&contact("a")).await, Err(StoreError::Conflict(_))));

        let mut a = contact("a");
        a.status = ContactStatus::Confirmed;
        a.own_kem_secret_key = None;
        a.peer_kem_public_key = Some(vec![7; 4]);
        store.update(&a).await.unwrap();
        let got = RecordStore::<ContactRecord>::get(&store, "a").await.unwrap().unwrap();
        assert_eq!(got, a);

        let all = RecordStore::<ContactRecord>::get_all(&store).await.unwrap();
        assert_eq!(all.iter().map(|c| c.contact_id.as_str()).collect::<Vec<_>>(), ["a", "b"]);

        RecordStore::<ContactRecord>::delete(&store, "b").await.unwrap();
        assert!(matches!(
            RecordStore::<ContactRecord>::delete(&store, "b").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.update(&contact("zz")).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn seen_handshakes_outlive_their_contact() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("lc.db")).await.unwrap();
        store.vault().unlock_with_key([4u8; 32]).await;

        store.save(&contact("a")).await.unwrap();
        let seen = SeenHandshake { digest: "ab12".into(), contact_id: "a".into(), seen_at: 1_700_000_000 };
        store.save(&seen).await.unwrap();
        assert!(matches!(store.save(&seen).await, Err(StoreError::Conflict(_))));

        RecordStore::<ContactRecord>::delete(&store, "a").await.unwrap();
        let got = RecordStore::<SeenHandshake>::get(&store, "ab12").await.unwrap();
        assert_eq!(got, Some(seen));
        assert_eq!(RecordStore::<SeenHandshake>::get_all(&store).await.unwrap().len(), 1);
    }
}
