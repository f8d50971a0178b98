//! Account lifecycle: creation behind the admission puzzle, loading the
//! stored identity into the session, profile updates, sign-out.

use std::sync::Arc;

use zeroize::Zeroizing;

use lc_crypto::{
    account_id_for, AdmissionEvent, AdmissionOutcome, AdmissionSearch, CancelFlag, SigningIdentity,
};
use lc_proto::api::{
    routes, AvatarUpdated, RegisterAccount, UpdateAvatar, UpdateBio, UpdateFullName, UpdateUsername,
    UsernameAvailability, UsernameAvailabilityRequest,
};
use lc_proto::now_unix;
use lc_store::{AccountRecord, RecordStore};

use crate::api::ApiClient;
use crate::collaborators::CaptchaProvider;
use crate::error::ClientError;
use crate::session::{SessionCache, Signer};

/// Display fields chosen at registration.
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered { account_id: String },
    /// The attempt budget ran out. Start again with a fresh identity.
    AdmissionExhausted,
    Cancelled,
}

pub struct AccountService {
    session: SessionCache,
    api: ApiClient,
    accounts: Arc<dyn RecordStore<AccountRecord>>,
    captcha: Arc<dyn CaptchaProvider>,
    admission: AdmissionSearch,
}

impl AccountService {
    pub fn new(
        session: SessionCache,
        api: ApiClient,
        accounts: Arc<dyn RecordStore<AccountRecord>>,
        captcha: Arc<dyn CaptchaProvider>,
    ) -> Self {
        Self {
            session,
            api,
            accounts,
            captcha,
            admission: AdmissionSearch::default(),
        }
    }

    /// Replace the admission difficulty (test servers).
    pub fn with_admission(mut self, admission: AdmissionSearch) -> Self {
        self.admission = admission;
        self
    }

    /// Generate an identity, solve its admission puzzle on a blocking worker,
    /// register it and persist it. On success the new identity is loaded.
    pub async fn create_account<F>(
        &self,
        fields: NewAccount,
        mut observer: F,
        cancel: CancelFlag,
    ) -> Result<RegistrationOutcome, ClientError>
    where
        F: FnMut(AdmissionEvent) + Send + 'static,
    {
        let identity = SigningIdentity::generate()?;
        let account_id = identity.account_id();
        let public_b64 = identity.public_b64();
        tracing::info!(%account_id, "[account] identity generated, solving admission puzzle");

        let search = self.admission.clone();
        let outcome = tokio::task::spawn_blocking(move || search.run(&public_b64, &cancel, &mut observer))
            .await
            .map_err(|e| ClientError::InvalidState(format!("admission worker failed: {e}")))?;

        let proof = match outcome {
            AdmissionOutcome::Solved(proof) => proof,
            AdmissionOutcome::Exhausted => {
                tracing::warn!("[account] admission attempts exhausted");
                return Ok(RegistrationOutcome::AdmissionExhausted);
            }
            AdmissionOutcome::Cancelled => {
                tracing::info!("[account] admission cancelled");
                return Ok(RegistrationOutcome::Cancelled);
            }
        };

        let captcha_token = self.captcha.captcha_token().await?;
        let payload = RegisterAccount {
            account_id: account_id.clone(),
            username: fields.username.clone(),
            first_name: fields.first_name.clone(),
            last_name: fields.last_name.clone(),
            signature_public_key: identity.public.as_bytes().to_vec(),
            proof_of_work: proof.hash,
            proof_of_work_nonce: proof.nonce,
            captcha_token,
            timestamp: now_unix(),
        };

        let signer = Signer::new(Arc::new(identity.clone()));
        self.api.post_signed(routes::REGISTER, &payload, &signer).await?;

        let record = AccountRecord {
            account_id: account_id.clone(),
            username: fields.username.clone(),
            first_name: fields.first_name,
            last_name: fields.last_name,
            bio: None,
            avatar_url: String::new(),
            signature_public_key: identity.public.as_bytes().to_vec(),
            signature_private_key: Zeroizing::new(identity.secret_bytes().to_vec()),
            version: 0,
        };
        self.accounts.save(&record).await?;
        self.session.load(identity, Some(fields.username));

        tracing::info!(%account_id, "[account] registered");
        Ok(RegistrationOutcome::Registered { account_id })
    }

    /// Load the stored identity into the session. `Ok(false)` if there is no
    /// stored account.
    pub async fn load_session(&self) -> Result<bool, ClientError> {
        let Some(record) = self.accounts.get_all().await?.into_iter().next() else {
            return Ok(false);
        };
        if account_id_for(&record.signature_public_key) != record.account_id {
            return Err(ClientError::InvalidState(
                "stored account id does not match its public key".into(),
            ));
        }
        let identity =
            SigningIdentity::from_bytes(&record.signature_public_key, &record.signature_private_key)?;
        self.session.load(identity, Some(record.username.clone()));
        tracing::info!(account_id = %record.account_id, "[account] session loaded");
        Ok(true)
    }

    pub async fn account_exists(&self) -> Result<bool, ClientError> {
        Ok(!self.accounts.get_all().await?.is_empty())
    }

    pub async fn current_account(&self) -> Result<Option<AccountRecord>, ClientError> {
        let Some(account_id) = self.session.account_id() else {
            return Ok(None);
        };
        Ok(self.accounts.get(&account_id).await?)
    }

    pub async fn username_available(&self, username: &str) -> Result<bool, ClientError> {
        let query = UsernameAvailabilityRequest { username: username.to_string() };
        let res = self.api.post_json(routes::USERNAME_AVAILABLE, &query).await?;
        Ok(res.json::<UsernameAvailability>()?.available)
    }

    pub async fn update_username(&self, username: &str) -> Result<(), ClientError> {
        let signer = self.session.signer()?;
        let payload = UpdateUsername {
            account_id: signer.account_id().to_string(),
            username: username.to_string(),
            timestamp: now_unix(),
        };
        self.api.post_signed(routes::UPDATE_USERNAME, &payload, &signer).await?;
        self.update_record(signer.account_id(), |a| a.username = username.to_string())
            .await?;
        self.session.set_username(username);
        Ok(())
    }

    pub async fn update_full_name(&self, first_name: &str, last_name: &str) -> Result<(), ClientError> {
        let signer = self.session.signer()?;
        let payload = UpdateFullName {
            account_id: signer.account_id().to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            timestamp: now_unix(),
        };
        self.api.post_signed(routes::UPDATE_FULL_NAME, &payload, &signer).await?;
        self.update_record(signer.account_id(), |a| {
            a.first_name = Some(first_name.to_string()).filter(|s| !s.is_empty());
            a.last_name = Some(last_name.to_string()).filter(|s| !s.is_empty());
        })
        .await
    }

    pub async fn update_bio(&self, bio: &str) -> Result<(), ClientError> {
        let signer = self.session.signer()?;
        let payload = UpdateBio {
            account_id: signer.account_id().to_string(),
            bio: bio.to_string(),
            timestamp: now_unix(),
        };
        self.api.post_signed(routes::UPDATE_BIO, &payload, &signer).await?;
        self.update_record(signer.account_id(), |a| a.bio = Some(bio.to_string()).filter(|s| !s.is_empty()))
            .await
    }

    /// Upload a new avatar; the server answers with its URL and version.
    pub async fn update_avatar(&self, data: Vec<u8>, format: &str) -> Result<(), ClientError> {
        let signer = self.session.signer()?;
        let payload = UpdateAvatar {
            account_id: signer.account_id().to_string(),
            avatar_data: data,
            format: format.to_string(),
            timestamp: now_unix(),
        };
        let res = self.api.post_signed(routes::UPDATE_AVATAR, &payload, &signer).await?;
        let updated: AvatarUpdated = res.json()?;
        self.update_record(signer.account_id(), |a| {
            a.avatar_url = updated.avatar_url;
            a.version = updated.version;
        })
        .await
    }

    pub fn sign_out(&self) {
        self.session.clear();
        tracing::info!("[account] signed out");
    }

    async fn update_record(
        &self,
        account_id: &str,
        apply: impl FnOnce(&mut AccountRecord),
    ) -> Result<(), ClientError> {
        let mut record = self
            .accounts
            .get(account_id)
            .await?
            .ok_or_else(|| ClientError::InvalidState(format!("account {account_id} not stored")))?;
        apply(&mut record);
        self.accounts.update(&record).await?;
        Ok(())
    }
}
