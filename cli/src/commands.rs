//! Command handlers.
//!
//! Each handler loads the profile, does its work, and prints to stdout.
//! Commands that touch the network open a [`RelayGateway`] for the duration
//! of the command and close it afterwards, Ctrl+C included.
//!
//! A balance checkpoint that cannot be stored on every relay, even after a
//! few republish attempts, is parked in the profile. The next network
//! command for that wallet republishes it before doing anything else and
//! refuses to continue while it is still stuck.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use futures::future::join_all;
use tokio::signal;
use tracing::{info, warn};

use vvcoin_protocol::config::unix_now;
use vvcoin_protocol::event::{decode_checkpoint, EventKind};
use vvcoin_protocol::identity::{Keypair, PublicKey};
use vvcoin_protocol::ledger::{issue, LedgerError, ReconciliationEngine, TransferEngine};
use vvcoin_protocol::relay::{Filter, GatewayConfig, RelayGateway};

use crate::cli::{DebugCommands, EventsArgs, GlobalArgs, SendArgs, WalletArgs, WalletCommands};
use crate::display::WalletInfo;
use crate::profile::{Profile, ProfileStore};

/// Extra attempts at storing a checkpoint that only reached some relays.
const REPUBLISH_ATTEMPTS: u32 = 3;

/// Shared state for one invocation.
pub struct Context {
    store: ProfileStore,
    relay_override: Vec<String>,
    gateway_config: GatewayConfig,
}

impl Context {
    pub fn new(global: &GlobalArgs) -> Result<Self> {
        let store = match &global.config {
            Some(path) => ProfileStore::at(path),
            None => ProfileStore::default_location()?,
        };
        let gateway_config = GatewayConfig {
            request_timeout: Duration::from_secs(global.timeout_secs.max(1)),
            ..GatewayConfig::default()
        };
        Ok(Self {
            store,
            relay_override: global.relays.clone(),
            gateway_config,
        })
    }

    fn load(&self) -> Result<Profile> {
        self.store
            .load()
            .with_context(|| format!("failed to load profile {}", self.store.path().display()))
    }

    fn save(&self, profile: &Profile) -> Result<()> {
        self.store
            .save(profile)
            .with_context(|| format!("failed to save profile {}", self.store.path().display()))
    }

    fn relays<'a>(&'a self, profile: &'a Profile) -> &'a [String] {
        if self.relay_override.is_empty() {
            &profile.relays
        } else {
            &self.relay_override
        }
    }

    /// Run `work` against a freshly opened gateway, then close it.
    async fn with_gateway<T, F, Fut>(&self, relays: &[String], work: F) -> Result<T>
    where
        F: FnOnce(Arc<RelayGateway>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let gateway = Arc::new(
            RelayGateway::connect(relays, self.gateway_config)
                .context("invalid relay configuration")?,
        );
        info!(relays = ?relays, "relay gateway opened");

        let token = gateway.cancellation_token();
        let watcher = tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling relay requests");
                token.cancel();
            }
        });

        let result = work(Arc::clone(&gateway)).await;
        watcher.abort();
        gateway.close().await;
        result
    }
}


// ---------------------------------------------------------------------------
// wallet
// ---------------------------------------------------------------------------

pub async fn wallet(ctx: &Context, args: WalletArgs) -> Result<()> {
    match args.command {
        None => show_wallet(ctx, args.wallet.as_deref(), args.show_secret, args.update).await,
        Some(WalletCommands::Create { name, show_secret }) => create_wallet(ctx, &name, show_secret),
        Some(WalletCommands::List) => {
            for name in ctx.load()?.wallet_names() {
                println!("{name}");
            }
            Ok(())
        }
        Some(WalletCommands::Config { wallet, new_name }) => {
            let mut profile = ctx.load()?;
            profile.rename_wallet(&wallet, &new_name)?;
            ctx.save(&profile)?;
            println!("Done: {wallet} -> {new_name}");
            Ok(())
        }
        Some(WalletCommands::Remove { wallet }) => remove_wallet(ctx, &wallet).await,
        Some(WalletCommands::Set { wallet }) => {
            let mut profile = ctx.load()?;
            profile.set_default(&wallet)?;
            ctx.save(&profile)?;
            println!("Done");
            Ok(())
        }
        Some(WalletCommands::Update { wallet, all }) => update_wallets(ctx, wallet.as_deref(), all).await,
    }
}

async fn show_wallet(ctx: &Context, wallet: Option<&str>, show_secret: bool, update: bool) -> Result<()> {
    let mut profile = ctx.load()?;
    let (name, keypair) = profile.select(wallet)?;
    let relays = ctx.relays(&profile).to_vec();
    let (kp, parked) = (&keypair, &mut profile);

    let balance = ctx
        .with_gateway(&relays, |gateway| async move {
            let engine = ReconciliationEngine::new(gateway);
            flush_parked(ctx, parked, &engine, &kp.public_key()).await?;
            if update {
                reconcile_settled(&engine, kp)
                    .await
                    .map_err(|e| park(ctx, parked, e))
            } else {
                Ok(engine.current_balance(&kp.public_key()).await?)
            }
        })
        .await?;

    println!(
        "{}",
        WalletInfo {
            name: &name,
            balance,
            keypair: &keypair,
            show_secret,
        }
    );
    Ok(())
}

fn create_wallet(ctx: &Context, name: &str, show_secret: bool) -> Result<()> {
    let mut profile = ctx.load()?;
    let keypair = profile.create_wallet(name)?;
    ctx.save(&profile)?;
    info!(wallet = name, npub = %keypair.public_key().to_npub(), "wallet created");

    println!(
        "{}",
        WalletInfo {
            name,
            balance: 0,
            keypair: &keypair,
            show_secret,
        }
    );
    Ok(())
}

async fn remove_wallet(ctx: &Context, name: &str) -> Result<()> {
    let mut profile = ctx.load()?;
    let keypair = profile.keypair(name)?;
    let account = keypair.public_key();
    let relays = ctx.relays(&profile).to_vec();
    let balance = ctx
        .with_gateway(&relays, |gateway| async move {
            Ok(ReconciliationEngine::new(gateway)
                .current_balance(&account)
                .await?)
        })
        .await?;

    profile.remove_wallet(name)?;
    ctx.save(&profile)?;

    println!("Wallet removed");
    println!(
        "{}",
        WalletInfo {
            name,
            balance,
            keypair: &keypair,
            show_secret: false,
        }
    );
    Ok(())
}

async fn update_wallets(ctx: &Context, wallet: Option<&str>, all: bool) -> Result<()> {
    let mut profile = ctx.load()?;
    let targets: Vec<(String, Keypair)> = if all {
        profile
            .wallet_names()
            .map(|name| Ok((name.to_string(), profile.keypair(name)?)))
            .collect::<Result<_>>()?
    } else {
        vec![profile.select(wallet)?]
    };
    if targets.is_empty() {
        bail!("no wallet selected");
    }
    let relays = ctx.relays(&profile).to_vec();
    let (targets, parked) = (&targets, &mut profile);

    let outcomes = ctx
        .with_gateway(&relays, |gateway| async move {
            let engine = ReconciliationEngine::new(gateway);

            // Parked checkpoints go out one wallet at a time; only wallets
            // with nothing stuck are reconciled.
            let mut outcomes: Vec<Result<u64>> = Vec::with_capacity(targets.len());
            let mut ready = Vec::new();
            for (i, (_, keypair)) in targets.iter().enumerate() {
                match flush_parked(ctx, parked, &engine, &keypair.public_key()).await {
                    Ok(()) => {
                        ready.push(i);
                        outcomes.push(Ok(0));
                    }
                    Err(e) => outcomes.push(Err(e)),
                }
            }

            let settled = join_all(
                ready
                    .iter()
                    .map(|&i| reconcile_settled(&engine, &targets[i].1)),
            )
            .await;
            for (i, result) in ready.into_iter().zip(settled) {
                outcomes[i] = result.map_err(|e| park(ctx, parked, e));
            }
            Ok(outcomes)
        })
        .await?;

    let mut failed = 0usize;
    for ((name, _), outcome) in targets.iter().zip(outcomes) {
        match outcome {
            Ok(balance) => println!("{name}: {balance}vvc"),
            Err(e) => {
                failed += 1;
                eprintln!("{name}: {e:#}");
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} wallets failed to update", targets.len());
    }
    println!("Update Done!");
    Ok(())
}

// ---------------------------------------------------------------------------
// send
// ---------------------------------------------------------------------------

pub async fn send(ctx: &Context, args: SendArgs) -> Result<()> {
    let recipient = PublicKey::parse(&args.target)
        .with_context(|| format!("invalid recipient '{}'", args.target))?;
    let mut profile = ctx.load()?;
    let (_, keypair) = profile.select(args.wallet.as_deref())?;
    let relays = ctx.relays(&profile).to_vec();
    let (kp, parked, amount) = (&keypair, &mut profile, args.amount);
    let memo = args.memo;

    let balance = ctx
        .with_gateway(&relays, |gateway| async move {
            let engine = TransferEngine::new(gateway);
            flush_parked(ctx, parked, engine.reconciler(), &kp.public_key()).await?;
            send_settled(&engine, kp, &recipient, amount, memo)
                .await
                .map_err(|e| park(ctx, parked, e))
        })
        .await?;

    println!("Sent to {}: {}vvc", args.target, amount);
    println!("Balance: {balance}vvc");
    Ok(())
}

/// Send, then see the balance checkpoint through.
///
/// A receive checkpoint that fails inside the reconcile step means nothing
/// was sent yet: it is republished and the send runs once more. A checkpoint
/// that fails after the transfer went out is only ever republished.
async fn send_settled(
    engine: &TransferEngine,
    keypair: &Keypair,
    recipient: &PublicKey,
    amount: u64,
    memo: Option<String>,
) -> Result<u64, LedgerError> {
    let mut retried = false;
    loop {
        match engine.send(keypair, recipient, amount, memo.clone()).await {
            Ok(receipt) => return Ok(receipt.balance),
            Err(err @ LedgerError::SendCheckpointNotPersisted { .. }) => {
                return recover(engine.reconciler(), err).await;
            }
            Err(err @ LedgerError::CheckpointNotPersisted { .. }) if !retried => {
                recover(engine.reconciler(), err).await?;
                retried = true;
                info!("receive checkpoint stored, retrying the send");
            }
            Err(err) => return Err(err),
        }
    }
}

// ---------------------------------------------------------------------------
// debug
// ---------------------------------------------------------------------------

pub async fn debug(ctx: &Context, command: DebugCommands) -> Result<()> {
    let mut profile = ctx.load()?;
    let relays = ctx.relays(&profile).to_vec();
    match command {
        DebugCommands::Cheat { amount, wallet } => {
            let (_, keypair) = profile.select(wallet.as_deref())?;
            let (kp, parked) = (&keypair, &mut profile);
            ctx.with_gateway(&relays, |gateway| async move {
                match issue(&gateway, kp, amount, unix_now()).await {
                    Ok(_) => Ok(()),
                    Err(e) => recover(&ReconciliationEngine::new(gateway), e)
                        .await
                        .map(drop)
                        .map_err(|e| park(ctx, parked, e)),
                }
            })
            .await?;
            println!("Ok, you are GOD");
            println!("Balance set to {amount}vvc");
        }
        DebugCommands::Events(args) => {
            let filter = events_filter(&args)?;
            let events = ctx
                .with_gateway(&relays, |gateway| async move {
                    Ok(gateway.query_all(&filter).await?)
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
    }
    Ok(())
}

fn events_filter(args: &EventsArgs) -> Result<Filter> {
    let account = |value: &str| {
        PublicKey::parse(value).with_context(|| format!("invalid account '{value}'"))
    };

    let mut filter = Filter::new()
        .kind(EventKind::Transfer)
        .kind(EventKind::Checkpoint);
    if let Some(author) = &args.author {
        filter = filter.author(&account(author)?);
    }
    if let Some(to) = &args.addressed_to {
        filter = filter.addressed_to(&account(to)?);
    }
    if let Some(event_id) = &args.referencing {
        filter = filter.referencing(event_id);
    }
    if let Some(since) = args.since {
        filter = filter.since(since);
    }
    if let Some(until) = args.until {
        filter = filter.until(until);
    }
    if let Some(limit) = args.limit {
        filter = filter.limit(limit);
    }
    Ok(filter)
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

/// Reconcile, pushing a partially stored checkpoint the rest of the way.
async fn reconcile_settled(engine: &ReconciliationEngine, keypair: &Keypair) -> Result<u64, LedgerError> {
    match engine.reconcile(keypair).await {
        Ok(outcome) => Ok(outcome.balance),
        Err(e) => recover(engine, e).await,
    }
}

/// A checkpoint that missed some relays gets republished a few times before
/// giving up, at which point the error comes back unchanged. Every other
/// error passes through untouched.
async fn recover(engine: &ReconciliationEngine, err: LedgerError) -> Result<u64, LedgerError> {
    let Some(checkpoint) = err.unpublished_checkpoint().cloned() else {
        return Err(err);
    };
    let balance = match decode_checkpoint(&checkpoint) {
        Ok(decoded) => decoded.balance,
        Err(_) => return Err(err),
    };

    for attempt in 1..=REPUBLISH_ATTEMPTS {
        tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
        match engine.republish(&checkpoint).await {
            Ok(receipt) => {
                info!(checkpoint = %receipt.event_id, attempt, "checkpoint stored on every relay");
                return Ok(balance);
            }
            Err(e) => warn!(checkpoint = %checkpoint.id, attempt, error = %e, "checkpoint republish failed"),
        }
    }
    Err(err)
}

/// Keep the checkpoint a failed error carries in the profile and turn the
/// error into what the user sees. If even the profile can't be written, the
/// checkpoint JSON goes to stderr.
fn park(ctx: &Context, profile: &mut Profile, err: LedgerError) -> anyhow::Error {
    let Some(checkpoint) = err.unpublished_checkpoint().cloned() else {
        return err.into();
    };
    let sent = err.published_transfer().map(str::to_string);
    let id = checkpoint.id.clone();

    let hint = if profile.park_checkpoint(checkpoint.clone()) {
        match ctx.save(profile) {
            Ok(()) => {
                warn!(checkpoint = %id, "checkpoint parked in the profile");
                format!(
                    "checkpoint {id} was saved to the profile; the next `vvc wallet` or \
                     `vvc send` for this wallet stores it"
                )
            }
            Err(save_err) => {
                warn!(checkpoint = %id, error = %format!("{save_err:#}"), "could not park checkpoint");
                if let Ok(json) = serde_json::to_string(&checkpoint) {
                    eprintln!("{json}");
                }
                format!(
                    "checkpoint {id} could not be saved; its JSON is printed above, \
                     publish it to your relays before sending again"
                )
            }
        }
    } else {
        format!("checkpoint {id} is already parked in the profile; try again later")
    };

    let err = anyhow::Error::new(err).context(hint);
    match sent {
        Some(transfer) => err.context(format!(
            "transfer {transfer} was sent, but the balance checkpoint is not on every relay yet"
        )),
        None => err,
    }
}

/// Republish checkpoints an earlier run parked for `account`. One that still
/// can't be stored stays parked and fails the command.
async fn flush_parked(
    ctx: &Context,
    profile: &mut Profile,
    engine: &ReconciliationEngine,
    account: &PublicKey,
) -> Result<()> {
    let parked = profile.pending_for(account);
    if parked.is_empty() {
        return Ok(());
    }

    let mut stuck = 0usize;
    for checkpoint in &parked {
        match engine.republish(checkpoint).await {
            Ok(_) => {
                info!(checkpoint = %checkpoint.id, "parked checkpoint stored");
                profile.clear_pending(&checkpoint.id);
            }
            Err(e) => {
                warn!(checkpoint = %checkpoint.id, error = %e, "parked checkpoint still not stored");
                stuck += 1;
            }
        }
    }
    ctx.save(profile)?;

    if stuck > 0 {
        bail!(
            "{stuck} parked checkpoint(s) for {} still can't be stored on every relay; try again later",
            account.to_npub()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vvcoin_protocol::event::{Event, TransferDraft};
    use vvcoin_protocol::relay::{MemoryRelay, RelayEndpoint};

    struct Fixture {
        _dir: TempDir,
        ctx: Context,
        relays: Vec<Arc<MemoryRelay>>,
        gateway: Arc<RelayGateway>,
    }

    impl Fixture {
        fn new(relay_count: usize) -> Self {
            let dir = TempDir::new().unwrap();
            let ctx = Context {
                store: ProfileStore::at(dir.path().join("config.json")),
                relay_override: Vec::new(),
                gateway_config: GatewayConfig::default(),
            };
            let relays: Vec<Arc<MemoryRelay>> = (0..relay_count)
                .map(|i| Arc::new(MemoryRelay::new(format!("mem://relay-{i}"))))
                .collect();
            let endpoints: Vec<Arc<dyn RelayEndpoint>> = relays
                .iter()
                .map(|r| Arc::clone(r) as Arc<dyn RelayEndpoint>)
                .collect();
            let gateway =
                Arc::new(RelayGateway::new(endpoints, GatewayConfig::default()).unwrap());
            Self {
                _dir: dir,
                ctx,
                relays,
                gateway,
            }
        }

        fn sender(&self) -> TransferEngine {
            TransferEngine::new(Arc::clone(&self.gateway))
        }

        fn seed(&self, event: &Event) {
            for relay in &self.relays {
                relay.seed(event.clone());
            }
        }
    }

    fn transfer(from: &Keypair, to: &Keypair, amount: u64, created_at: u64) -> Event {
        TransferDraft {
            recipient: to.public_key(),
            amount,
            memo: None,
            created_at,
        }
        .sign(from)
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_receive_checkpoint_is_not_reported_as_a_send() {
        let fx = Fixture::new(2);
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        fx.seed(&transfer(&bob, &alice, 50, 10));
        fx.relays[1].set_rejecting(true);

        let err = send_settled(&fx.sender(), &alice, &bob.public_key(), 20, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::CheckpointNotPersisted { balance: 50, .. }));
        assert_eq!(err.published_transfer(), None);

        let alice_hex = alice.public_key().to_hex();
        assert!(fx.relays[0]
            .events()
            .iter()
            .all(|e| !(e.pubkey == alice_hex && e.kind == EventKind::Transfer.as_u32())));
    }

    #[tokio::test(start_paused = true)]
    async fn receive_checkpoint_recovered_then_send_goes_through() {
        let fx = Fixture::new(1);
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        fx.seed(&transfer(&bob, &alice, 50, 10));
        fx.relays[0].set_rejecting(true);

        let relay = Arc::clone(&fx.relays[0]);
        let unblock = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            relay.set_rejecting(false);
        });

        let balance = send_settled(&fx.sender(), &alice, &bob.public_key(), 20, None)
            .await
            .unwrap();
        unblock.await.unwrap();
        assert_eq!(balance, 30);

        let reconciler = ReconciliationEngine::new(Arc::clone(&fx.gateway));
        assert_eq!(reconciler.current_balance(&alice.public_key()).await.unwrap(), 30);
        assert_eq!(reconciler.reconcile(&bob).await.unwrap().balance, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_send_checkpoint_is_parked_and_flushed_later() {
        let fx = Fixture::new(1);
        let mut profile = Profile::default();
        let alice = profile.create_wallet("alice").unwrap();
        let bob = Keypair::generate();
        issue(&fx.gateway, &alice, 50, 100).await.unwrap();

        fx.relays[0].reject_kind(Some(EventKind::Checkpoint));
        let err = send_settled(&fx.sender(), &alice, &bob.public_key(), 20, None)
            .await
            .unwrap_err();
        let transfer_id = err.published_transfer().unwrap().to_string();

        let shown = format!("{:#}", park(&fx.ctx, &mut profile, err));
        assert!(shown.contains(&transfer_id));
        assert!(shown.contains("saved to the profile"));

        let mut reloaded = fx.ctx.load().unwrap();
        assert_eq!(reloaded.pending_for(&alice.public_key()).len(), 1);

        let reconciler = ReconciliationEngine::new(Arc::clone(&fx.gateway));
        assert!(flush_parked(&fx.ctx, &mut reloaded, &reconciler, &alice.public_key())
            .await
            .is_err());
        assert_eq!(fx.ctx.load().unwrap().pending.len(), 1);

        fx.relays[0].reject_kind(None);
        flush_parked(&fx.ctx, &mut reloaded, &reconciler, &alice.public_key())
            .await
            .unwrap();
        assert!(fx.ctx.load().unwrap().pending.is_empty());
        assert_eq!(reconciler.current_balance(&alice.public_key()).await.unwrap(), 30);
    }

    #[test]
    fn events_filter_narrows_by_reference_and_time() {
        let args = EventsArgs {
            referencing: Some("ab".repeat(32)),
            until: Some(500),
            since: Some(100),
            ..EventsArgs::default()
        };
        let json = serde_json::to_value(events_filter(&args).unwrap()).unwrap();
        assert_eq!(json["#e"][0], "ab".repeat(32));
        assert_eq!(json["until"], 500);
        assert_eq!(json["since"], 100);
        assert_eq!(json["kinds"].as_array().unwrap().len(), 2);

        let bad = EventsArgs {
            author: Some("npub1nope".into()),
            ..EventsArgs::default()
        };
        assert!(events_filter(&bad).is_err());
    }
}
