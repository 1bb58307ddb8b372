//! Ring chat simulation.
//!
//! Assembles a ring of chat domains, attaches every user to its home domain
//! and drives each user's instruction through the message protocol:
//! - Every user sends exactly one message to a user of the opposite domain
//! - Receivers get a TRANSIT, senders get an AR (or an error reply)
//! - A second attach of an already connected user is refused
//!
//! Run four domains of two users each:
//!   cargo run -p ring-chat -- --domains 4 --users 2
//! Uneven domains, one blocked pair:
//!   cargo run -p ring-chat -- --domains 5 --users 2,1,1,1,1 --block d0u0:d2u0

mod protocol;
mod server;

use clap::Parser;
use ringnet_core::{BlockList, Clock, ManualClock, RingConfig, SystemClock, VertexId};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Simulate a ring of chat domains.
#[derive(Debug, Parser)]
#[command(name = "ring-chat", version)]
struct Args {
    /// Number of domains on the ring.
    #[arg(long, default_value_t = 4)]
    domains: usize,

    /// Users per domain: one value for every domain, or one per domain.
    #[arg(long, value_delimiter = ',', default_value = "2")]
    users: Vec<usize>,

    /// Shuffle the ring order with this seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Forbid SENDER from reaching RECEIVER (payloads, e.g. d0u0:d2u0).
    #[arg(long = "block", value_parser = parse_block)]
    blocks: Vec<(VertexId, VertexId)>,

    /// Use a deterministic clock instead of wall time.
    #[arg(long)]
    manual_clock: bool,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

impl Args {
    fn ring_config(&self) -> anyhow::Result<RingConfig> {
        let users = match self.users.as_slice() {
            [n] => vec![*n; self.domains],
            list if list.len() == self.domains => list.to_vec(),
            list => anyhow::bail!(
                "--users lists {} counts for {} domains",
                list.len(),
                self.domains
            ),
        };
        let config = RingConfig::new(users);
        Ok(match self.seed {
            Some(seed) => config.with_shuffle_seed(seed),
            None => config,
        })
    }

    fn policy(&self) -> BlockList {
        let mut blocks = BlockList::new();
        for (sender, receiver) in &self.blocks {
            blocks.block(sender.clone(), receiver.clone());
        }
        blocks
    }
}

fn parse_block(s: &str) -> Result<(VertexId, VertexId), String> {
    let (sender, receiver) = s
        .split_once(':')
        .ok_or_else(|| format!("expected SENDER:RECEIVER, got: {s}"))?;
    let id = |payload: &str| {
        VertexId::try_new(payload)
            .map_err(|e| format!("expected SENDER:RECEIVER, got: {s} ({e})"))
    };
    Ok((id(sender)?, id(receiver)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ring_chat=info".parse()?))
        .init();

    let args = Args::parse();
    let config = args.ring_config()?;
    let clock: Arc<dyn Clock> = if args.manual_clock {
        Arc::new(ManualClock::default())
    } else {
        Arc::new(SystemClock::new())
    };

    tracing::info!(
        "Assembling {} domains with {:?} users",
        config.domain_count(),
        config.users_per_domain
    );
    let report = server::run(config, args.policy(), clock).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    tracing::info!(
        "{} users, {} instructions, {} delivered, largest frame {} bits",
        report.users,
        report.instructions,
        report.delivered,
        report.largest_frame_bits
    );
    for (kind, count) in &report.rejected {
        tracing::info!("{} x {}", count, kind);
    }
    if let Some((sender, receiver)) = &report.distinguished {
        tracing::info!("Distinguished message: {} -> {}", sender, receiver);
    }
    if let Some(fatal) = &report.duplicate_attach {
        tracing::info!("Duplicate attach refused: {}", fatal);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_user_count_applies_to_every_domain() {
        let args = Args::parse_from(["ring-chat", "--domains", "3", "--users", "2"]);
        assert_eq!(args.ring_config().unwrap().users_per_domain, vec![2, 2, 2]);

        let args = Args::parse_from(["ring-chat", "--domains", "2", "--users", "1,3"]);
        assert_eq!(args.ring_config().unwrap().users_per_domain, vec![1, 3]);

        let args = Args::parse_from(["ring-chat", "--domains", "3", "--users", "1,3"]);
        assert!(args.ring_config().is_err());
    }

    #[test]
    fn block_flags_parse_into_pairs() {
        let args = Args::parse_from(["ring-chat", "--block", "d0u0:d2u0", "--seed", "9"]);
        assert_eq!(args.policy().len(), 1);
        assert_eq!(args.ring_config().unwrap().shuffle_seed, Some(9));
        assert!(parse_block("d0u0").is_err());
        assert!(parse_block(":d0u0").is_err());
    }
}
