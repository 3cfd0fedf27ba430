use std::process::exit;

use clap::Parser;
use sugars::rc;

use dslab_consolidation::core::clock::{ManualClock, PlanningContext};
use dslab_consolidation::core::config::{ClusterConfig, PlannerConfig};
use dslab_consolidation::core::controller::MigrationController;
use dslab_consolidation::core::error::Result;
use dslab_consolidation::{log_error, log_info};

fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to cluster config
    #[clap(short, long)]
    cluster: String,

    /// Path to planner config
    #[clap(short, long)]
    planner: String,

    /// Number of planning rounds, the plan of each round is applied before the next one
    #[clap(short, long, default_value_t = 1)]
    rounds: u32,

    /// Time between planning rounds
    #[clap(short, long, default_value_t = 300.)]
    interval: f64,

    /// Path to CSV file for utilization history
    #[clap(long)]
    history: Option<String>,
}

fn run(args: &Args) -> Result<()> {
    let mut cluster = ClusterConfig::from_file(&args.cluster)?.build()?;
    let config = PlannerConfig::from_file(&args.planner)?;
    let clock = rc!(ManualClock::new(0.));
    let ctx = PlanningContext::new("demo", clock.clone());
    let mut planner = MigrationController::new(config, ctx.child("planner"))?;

    for round in 0..args.rounds {
        let plan = planner.optimize(&mut cluster)?;
        log_info!(ctx, "round {}: {} migrations", round, plan.len());
        println!("{}", serde_json::to_string_pretty(&plan).unwrap_or_default());
        if plan.is_empty() {
            break;
        }
        cluster.apply_plan(&plan)?;
        for host in cluster.hosts() {
            log_info!(ctx, "host {} load {:.3}", host.name, host.get_cpu_load());
        }
        clock.advance(args.interval);
    }

    let times = planner.history().execution_times();
    log_info!(ctx, "total planning time: {:.6}s", times.total.iter().sum::<f64>());
    if let Some(path) = &args.history {
        planner.history().save_csv(path)?;
    }
    Ok(())
}

fn main() {
    init_logger();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        let ctx = PlanningContext::new("demo", rc!(ManualClock::new(0.)));
        log_error!(ctx, "{}", e);
        exit(1);
    }
}
