use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use lc_client::channel::{mint_token, TokenProvider};
use lc_client::collaborators::{EnvPassphrase, LogNotifier, PassphraseProvider, StaticCaptcha};
use lc_client::{
    AccountService, ApiClient, ChannelEvent, ClientConfig, ContactDispatcher, ContactExchange,
    NewAccount, PushChannel, ReconnectPolicy, RegistrationOutcome, ReqwestTransport, SessionCache,
    WebSocketTransport,
};
use lc_crypto::admission::verify_admission;
use lc_crypto::{AdmissionEvent, AdmissionOutcome, AdmissionProof, AdmissionSearch, CancelFlag, SigningIdentity};
use lc_store::{ContactStatus, SqliteStore};

const PASSPHRASE_VAR: &str = "LC_PASSPHRASE";

#[derive(Parser)]
#[command(name = "lc")]
#[command(about = "Lattice Contact client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve an admission puzzle for a public key (a throwaway one if omitted)
    Admission {
        /// Base64 ML-DSA-87 public key
        #[arg(long)]
        public_key: Option<String>,
    },

    /// Check an admission proof
    Verify {
        #[arg(long)]
        public_key: String,
        #[arg(long)]
        nonce: String,
        #[arg(long)]
        hash: String,
    },

    /// Create and register a new account
    Register {
        username: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        /// Captcha token obtained out of band
        #[arg(long)]
        captcha: String,
    },

    /// Show the stored account
    Whoami,

    /// Look up a user by username or account id
    Find { identifier: String },

    /// Send a contact request
    Add { identifier: String },

    /// List contacts with a given status
    Contacts {
        #[arg(short, long, default_value = "confirmed")]
        status: ContactStatus,
        #[arg(short, long, default_value = "")]
        query: String,
    },

    /// Accept a pending request
    Confirm { contact_id: String },

    /// Reject a pending request
    Reject {
        contact_id: String,
        /// Block the sender as well
        #[arg(long)]
        block: bool,
    },

    Block { contact_id: String },

    Unblock { contact_id: String },

    Delete { contact_id: String },

    /// Connect the push channel and process inbound requests until Ctrl-C
    Listen,
}

/// Everything a command needs, wired from config.
struct Client {
    config: ClientConfig,
    session: SessionCache,
    accounts: AccountService,
    contacts: Arc<ContactExchange>,
}

impl Client {
    async fn open(config: ClientConfig, captcha: String) -> Result<Self> {
        let store = Arc::new(
            SqliteStore::open(&config.db_path)
                .await
                .with_context(|| format!("opening {}", config.db_path.display()))?,
        );
        let passphrase = EnvPassphrase::new(PASSPHRASE_VAR).passphrase()?;
        store.unlock(&passphrase).await.context("unlocking store")?;

        let session = SessionCache::new();
        let api = ApiClient::new(Arc::new(ReqwestTransport::new(&config)?));
        let accounts = AccountService::new(
            session.clone(),
            api.clone(),
            store.clone(),
            Arc::new(StaticCaptcha(captcha)),
        );
        let contacts = Arc::new(ContactExchange::new(
            session.clone(),
            api,
            store.clone(),
            store,
            Arc::new(LogNotifier),
        ));
        Ok(Self { config, session, accounts, contacts })
    }

    /// Load the stored identity and the contact view.
    async fn signed_in(config: ClientConfig) -> Result<Self> {
        let client = Self::open(config, String::new()).await?;
        if !client.accounts.load_session().await? {
            bail!("no account stored; run `lc register` first");
        }
        if !client.contacts.load().await {
            bail!("could not load contacts");
        }
        Ok(client)
    }
}

fn spawn_ctrl_c_cancel(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
}

fn print_admission_event(event: AdmissionEvent) {
    match event {
        AdmissionEvent::Progress { attempts, nonce, hash } => {
            tracing::debug!(attempts, %nonce, %hash, "[admission] searching")
        }
        AdmissionEvent::Solved { attempts } => println!("solved after {attempts} attempts"),
        AdmissionEvent::Exhausted { attempts } => println!("gave up after {attempts} attempts"),
        AdmissionEvent::Cancelled { attempts } => println!("cancelled after {attempts} attempts"),
    }
}

fn report(done: bool, what: &str) -> Result<()> {
    if done {
        println!("{what}");
        Ok(())
    } else {
        Err(anyhow!("{what} failed; see log"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lc_cli=info,lc_client=info,lc_store=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env();

    match cli.command {
        Commands::Admission { public_key } => {
            let public_key = match public_key {
                Some(pk) => pk,
                None => SigningIdentity::generate()?.public_b64(),
            };
            let cancel = CancelFlag::new();
            spawn_ctrl_c_cancel(cancel.clone());
            let outcome = tokio::task::spawn_blocking(move || {
                AdmissionSearch::default().run(&public_key, &cancel, &mut print_admission_event)
            })
            .await?;
            if let AdmissionOutcome::Solved(proof) = outcome {
                println!("nonce: {}", proof.nonce);
                println!("hash:  {}", proof.hash);
            }
        }

        Commands::Verify { public_key, nonce, hash } => {
            let valid = verify_admission(&public_key, &AdmissionProof { nonce, hash });
            println!("{}", if valid { "valid" } else { "invalid" });
            if !valid {
                std::process::exit(1);
            }
        }

        Commands::Register { username, first_name, last_name, captcha } => {
            let client = Client::open(config, captcha).await?;
            if client.accounts.account_exists().await? {
                bail!("an account is already stored in this database");
            }
            let cancel = CancelFlag::new();
            spawn_ctrl_c_cancel(cancel.clone());
            let fields = NewAccount { username, first_name, last_name };
            match client.accounts.create_account(fields, print_admission_event, cancel).await? {
                RegistrationOutcome::Registered { account_id } => println!("registered {account_id}"),
                RegistrationOutcome::AdmissionExhausted => bail!("admission puzzle not solved; try again"),
                RegistrationOutcome::Cancelled => bail!("registration cancelled"),
            }
        }

        Commands::Whoami => {
            let client = Client::signed_in(config).await?;
            let account = client
                .accounts
                .current_account()
                .await?
                .ok_or_else(|| anyhow!("session has no stored account"))?;
            println!("account:  {}", account.account_id);
            println!("username: {}", account.username);
            println!("pending requests: {}", client.contacts.pending_request_count());
        }

        Commands::Find { identifier } => {
            let client = Client::signed_in(config).await?;
            match client.contacts.find_contact(&identifier).await {
                Some(found) => {
                    println!("{}  {}  {}", found.contact_id, found.username, found.full_name().trim())
                }
                None => bail!("no match for {identifier}"),
            }
        }

        Commands::Add { identifier } => {
            let client = Client::signed_in(config).await?;
            let found = client
                .contacts
                .find_contact(&identifier)
                .await
                .ok_or_else(|| anyhow!("no match for {identifier}"))?;
            report(client.contacts.add_contact(&found).await, "request sent")?;
        }

        Commands::Contacts { status, query } => {
            let client = Client::signed_in(config).await?;
            for entry in client.contacts.view(status, &query) {
                println!("{}  {}  {}", entry.contact_id, entry.username, entry.full_name);
            }
        }

        Commands::Confirm { contact_id } => {
            let client = Client::signed_in(config).await?;
            report(client.contacts.confirm_contact(&contact_id).await, "confirmed")?;
        }

        Commands::Reject { contact_id, block } => {
            let client = Client::signed_in(config).await?;
            if block {
                report(client.contacts.reject_and_block(&contact_id).await, "rejected and blocked")?;
            } else {
                report(client.contacts.reject_contact(&contact_id).await, "rejected")?;
            }
        }

        Commands::Block { contact_id } => {
            let client = Client::signed_in(config).await?;
            report(client.contacts.block_contact(&contact_id).await, "blocked")?;
        }

        Commands::Unblock { contact_id } => {
            let client = Client::signed_in(config).await?;
            report(client.contacts.unblock_contact(&contact_id).await, "unblocked")?;
        }

        Commands::Delete { contact_id } => {
            let client = Client::signed_in(config).await?;
            report(client.contacts.delete_contact(&contact_id).await, "deleted")?;
        }

        Commands::Listen => {
            let client = Client::signed_in(config).await?;
            let channel = PushChannel::new(
                Arc::new(WebSocketTransport::new(client.config.hub_url.clone())),
                ReconnectPolicy::default(),
            );
            Arc::new(ContactDispatcher::new(client.contacts.clone())).attach(&channel);

            let mut events = channel.subscribe_events();
            let mut requests = client.contacts.watch_request_count();
            let session = client.session.clone();
            let tokens: TokenProvider = Arc::new(move || mint_token(&session));
            channel.start(tokens).await?;
            println!("listening on {} (Ctrl-C to stop)", client.config.hub_url);

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    Ok(()) = requests.changed() => {
                        println!("pending requests: {}", *requests.borrow_and_update());
                    }
                    event = events.recv() => match event {
                        Ok(ChannelEvent::Closed { reason }) => {
                            bail!("channel closed: {}", reason.unwrap_or_default());
                        }
                        Ok(event) => tracing::info!(?event, "[cli] channel event"),
                        Err(e) => tracing::debug!(error = %e, "[cli] event stream lagged"),
                    },
                }
            }
            channel.stop().await;
        }
    }

    Ok(())
}
