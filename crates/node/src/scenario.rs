//! Scripted runs of the ring.
//!
//! Each scenario fixes `N`, `R` and `W`, and takes timeout, latency and log
//! level from the [Config] it is applied to.
use clap::ValueEnum;
use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::prelude::NodeInspect;
use crate::prelude::OpResult;
use crate::processor::node_addr;
use crate::processor::Processor;

/// The scenarios `ringkv run` knows.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    ValueEnum,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Scenario {
    /// N=2, R=2, W=2 on nodes 20, 30 and 40.
    Basic,
    /// N=5, R=2, W=4 on nodes 10 to 60.
    WriteQuorum,
}

/// What a scenario observed, step by step.
#[derive(Debug, Default, Serialize)]
pub struct Report {
    /// Outcome of every step, in order.
    pub steps: Vec<(String, bool)>,
    /// Nodes at the end of the run.
    pub nodes: Vec<NodeInspect>,
}

impl Report {
    fn record(&mut self, step: &str, ok: bool) {
        tracing::info!("== {}: {}", step, if ok { "ok" } else { "failed" });
        self.steps.push((step.to_string(), ok));
    }

    /// Outcome of the first step named `step`.
    pub fn outcome(&self, step: &str) -> Option<bool> {
        self.steps.iter().find(|(s, _)| s == step).map(|(_, ok)| *ok)
    }
}

impl Scenario {
    /// `config` with the ring parameters of the scenario.
    pub fn apply(&self, config: Config) -> Config {
        let (replication, read_quorum, write_quorum) = match self {
            Scenario::Basic => (2, 2, 2),
            Scenario::WriteQuorum => (5, 2, 4),
        };
        Config {
            replication,
            read_quorum,
            write_quorum,
            ..config
        }
    }

    /// Run the scenario on a fresh processor.
    pub async fn run(&self, config: Config) -> Result<Report> {
        let processor = Processor::new(self.apply(config))?;
        tracing::info!("running scenario {}", self);
        let mut report = match self {
            Scenario::Basic => basic(&processor).await?,
            Scenario::WriteQuorum => write_quorum(&processor).await?,
        };
        processor.print_all_items().await?;
        report.nodes = processor.inspect_all()?;
        processor.shutdown();
        Ok(report)
    }
}

async fn basic(p: &Processor) -> Result<Report> {
    let mut report = Report::default();
    let mut alice = p.client("alice")?;
    let mut bob = p.client("bob")?;

    report.record("init 20", p.init_system(20).await?);
    report.record("join 30", p.join(30, 20).await?);
    p.print_nodes(30).await?;

    let res = alice.update(&node_addr(20), 6, "VALUE6").await?;
    report.record(
        "update 6 to version 1",
        res.result == OpResult::Success && res.item.version == 1,
    );
    // Replicas keep the lock until the Write lands.
    p.settle().await;
    let res = bob.get(&node_addr(30), 6).await?;
    report.record(
        "get 6 through 30",
        res.result == OpResult::Success && res.item.map_or(false, |i| i.value == "VALUE6"),
    );

    report.record("crash 30", p.crash(30).await?);
    let res = alice.update(&node_addr(20), 6, "LOST").await?;
    report.record("update without quorum fails", res.result == OpResult::Error);
    p.settle().await;
    report.record("recover 30", p.recover(30, 20).await?);

    // Both coordinators race for the lock of item 6.
    let (addr20, addr30) = (node_addr(20), node_addr(30));
    let (a, b) = futures::join!(
        alice.update(&addr20, 6, "ALICE"),
        bob.update(&addr30, 6, "BOB"),
    );
    let successes = [a?, b?]
        .iter()
        .filter(|r| r.result == OpResult::Success)
        .count();
    report.record("at most one concurrent writer wins", successes <= 1);
    p.settle().await;

    for (key, value) in [(25, "VALUE25"), (35, "VALUE35"), (45, "VALUE45")] {
        let res = alice.update(&node_addr(20), key, value).await?;
        report.record(&format!("update {key}"), res.result == OpResult::Success);
    }
    p.settle().await;
    report.record("join 40", p.join(40, 20).await?);
    let shifted = p.inspect(40)?.items.iter().map(|i| i.key).collect::<Vec<_>>();
    report.record("40 holds the shifted items", shifted == vec![25, 35]);

    report.record("leave 40", p.leave(40).await?);
    report.record(
        "30 took items back",
        p.inspect(30)?.items.iter().any(|i| i.key == 35),
    );

    // A bootstrap nobody listens on: the join rolls back.
    report.record("join 50 through nobody aborts", !p.join(50, 99).await?);
    report.record("join 40 again", p.join(40, 30).await?);
    report.record("crash 30 again", p.crash(30).await?);
    report.record("leave 40 without acks rolls back", !p.leave(40).await?);
    report.record("40 kept its place", p.inspect(40)?.peers.contains(&40));
    report.record("recover 30 again", p.recover(30, 20).await?);

    Ok(report)
}

async fn write_quorum(p: &Processor) -> Result<Report> {
    let mut report = Report::default();
    let mut alice = p.client("alice")?;

    report.record("init 10", p.init_system(10).await?);
    for key in [20, 30, 40, 50, 60] {
        report.record(&format!("join {key}"), p.join(key, 10).await?);
    }

    let res = alice.update(&node_addr(10), 15, "VALUE15").await?;
    report.record("update 15 on five replicas", res.result == OpResult::Success);
    p.settle().await;

    report.record("crash 20", p.crash(20).await?);
    let res = alice.update(&node_addr(30), 15, "FOUR").await?;
    report.record(
        "four replicas still reach W",
        res.result == OpResult::Success && res.item.version == 2,
    );
    p.settle().await;

    report.record("crash 30", p.crash(30).await?);
    let res = alice.update(&node_addr(40), 15, "THREE").await?;
    report.record("three replicas miss W", res.result == OpResult::Error);
    p.settle().await;

    // 30 first: it is the neighbor 20 pulls its items from.
    report.record("recover 30", p.recover(30, 10).await?);
    report.record("recover 20", p.recover(20, 10).await?);
    let res = alice.update(&node_addr(60), 15, "BACK").await?;
    report.record(
        "recovered replicas vote again",
        res.result == OpResult::Success && res.item.version == 3,
    );
    p.settle().await;

    let res = alice.get(&node_addr(50), 15).await?;
    report.record(
        "get returns the last write",
        res.item.map_or(false, |i| i.version == 3 && i.value == "BACK"),
    );
    Ok(report)
}
