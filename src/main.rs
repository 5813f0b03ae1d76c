use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tweet_relay::config::{Config, Credentials};
use tweet_relay::discord::rest::DiscordRest;
use tweet_relay::feed::twitter_list::TwitterListFeed;
use tweet_relay::relay::cursor::{route_key, seed_from_message};
use tweet_relay::relay::format::MessageFormat;
use tweet_relay::relay::{Clock, CursorStore, Dispatcher, FileCursorStore, Poller, Route, TokioClock};
use tweet_relay::sink::discord_channel::DiscordChannelSink;
use tweet_relay::twitter::auth::TwitterAuth;
use tweet_relay::twitter::rest::TwitterRest;

struct Args {
    config: PathBuf,
    once: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: PathBuf::from("config.toml"),
        once: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--once" => args.once = true,
            "--config" => {
                let path = it.next().context("--config needs a path")?;
                args.config = PathBuf::from(path);
            }
            other => anyhow::bail!("unknown argument: {} (usage: tweet-relay [--config <path>] [--once])", other),
        }
    }
    Ok(args)
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tweet_relay=info"));
    match &config.logging.file {
        Some(path) => {
            let log_file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(log_file)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Seed a missing cursor from the channel's newest message. A failed
/// history lookup is not fatal: the route then backfills as usual.
async fn recover_cursor(discord: &DiscordRest, channel_id: &str, store: &mut FileCursorStore) -> Result<()> {
    let last = match discord.last_message(channel_id).await {
        Ok(last) => last,
        Err(e) => {
            tracing::warn!(channel_id, error = %e, "could not read channel history, backfilling instead");
            return Ok(());
        }
    };
    let seeded = seed_from_message(store, last.as_ref().map(|m| m.content.as_str()))
        .with_context(|| format!("Failed to seed cursor at {}", store.path().display()))?;
    match seeded {
        Some(cursor) => tracing::info!(
            channel_id,
            last_seen_id = ?cursor.last_seen_id,
            "cursor recovered from last channel message"
        ),
        None => tracing::info!(channel_id, "no relayed message in channel, backfilling"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;
    let config = Config::load(&args.config)?;
    init_logging(&config)?;

    // Load saved secrets from .env (real env vars take precedence)
    Config::load_env_file();
    let creds = Credentials::load(&config.credentials.info_file)?;

    let timeout = config.poll.request_timeout();
    let auth = Arc::new(TwitterAuth::new(
        creds.twitter.api_key.clone(),
        creds.twitter.api_secret_key.clone(),
        creds.twitter.access_token.clone(),
        creds.twitter.access_token_secret.clone(),
    ));
    let twitter = Arc::new(TwitterRest::new(auth, &config.twitter.api_base, timeout)?);
    let discord = Arc::new(DiscordRest::new(
        creds.discord.bot_token.clone(),
        &config.discord.api_base,
        timeout,
    )?);

    let me = twitter.verify_credentials().await?;
    tracing::info!(screen_name = %me.screen_name, "twitter credentials verified");

    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let policy = config.dispatch.retry_policy();
    let mut routes = Vec::with_capacity(config.routes.len());
    for rc in &config.routes {
        discord.check_channel(&rc.channel_id).await?;
        let key = route_key(&rc.list_id, &rc.channel_id);
        let mut store = FileCursorStore::open(&config.state.dir, &key)
            .with_context(|| format!("Failed to open cursor store for route {}", key))?;
        if config.state.recover_from_channel && store.load()?.is_empty() {
            recover_cursor(&discord, &rc.channel_id, &mut store).await?;
        }
        let dispatcher = Dispatcher::new(
            Box::new(DiscordChannelSink::new(discord.clone(), &rc.channel_id)),
            Box::new(store),
            clock.clone(),
            policy,
            MessageFormat::new(config.format.include_text),
            timeout,
        );
        routes.push(Route {
            key,
            source: Box::new(TwitterListFeed::new(
                twitter.clone(),
                &rc.list_id,
                config.twitter.backfill_count,
            )),
            dispatcher,
        });
    }

    let mut poller = Poller::new(routes, config.poll.interval(), clock, policy, timeout);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, finishing in-flight delivery");
            let _ = shutdown_tx.send(true);
        }
    });

    if args.once {
        let report = poller.run_cycle(&mut shutdown_rx).await?;
        tracing::info!(
            delivered = report.delivered(),
            skipped = report.skipped(),
            failed_routes = report.failed.len(),
            "single cycle finished"
        );
    } else {
        poller.run(shutdown_rx).await?;
    }

    tracing::info!("finished");
    Ok(())
}
