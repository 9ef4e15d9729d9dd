#![deny(warnings)]

//! Headless CLI: load a catalog, apply scripted actions and run ticks.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use sim_core::{EntityId, EntityKind, Funds, Info};
use sim_runtime::{run_ticker, Catalog, Game, SharedGame, TimeControl};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

struct Args {
    catalog: PathBuf,
    ticks: u64,
    speed: Option<f64>,
    interval_ms: Option<u64>,
    buys: Vec<(u32, u32)>,
    upgrades: Vec<(u32, String)>,
    sales: Vec<u32>,
    snapshot: bool,
}

fn parse_pair(flag: &str, value: Option<String>) -> Result<(u32, String)> {
    let value = value.with_context(|| format!("{flag} needs a value"))?;
    let (id, rest) = value
        .split_once(':')
        .with_context(|| format!("{flag} expects PROPERTY:VALUE, got {value:?}"))?;
    let id = id
        .parse()
        .with_context(|| format!("{flag}: bad property id {id:?}"))?;
    Ok((id, rest.to_string()))
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        catalog: PathBuf::from("assets/catalog.yaml"),
        ticks: 31,
        speed: None,
        interval_ms: None,
        buys: Vec::new(),
        upgrades: Vec::new(),
        sales: Vec::new(),
        snapshot: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--catalog" => args.catalog = it.next().context("--catalog needs a path")?.into(),
            "--ticks" => args.ticks = it.next().context("--ticks needs a count")?.parse()?,
            "--speed" => args.speed = Some(it.next().context("--speed needs a value")?.parse()?),
            "--interval-ms" => {
                args.interval_ms = Some(it.next().context("--interval-ms needs a value")?.parse()?)
            }
            "--buy" => {
                let (property, player) = parse_pair("--buy", it.next())?;
                args.buys.push((property, player.parse().context("--buy: bad player id")?));
            }
            "--upgrade" => args.upgrades.push(parse_pair("--upgrade", it.next())?),
            "--sell" => args
                .sales
                .push(it.next().context("--sell needs a property id")?.parse()?),
            "--snapshot" => args.snapshot = true,
            other => bail!("unknown argument {other:?}"),
        }
    }
    Ok(args)
}

fn apply_actions(game: &mut Game, args: &Args) {
    if let Some(speed) = args.speed {
        if let Err(err) = game.control_time(TimeControl::SetSpeed(speed)) {
            warn!(%err, "could not set speed");
        }
    }
    for &(property, player) in &args.buys {
        match game.buy_property(EntityId::property(property), EntityId::player(player)) {
            Ok(p) => info!(property = %p.property, buyer = %p.buyer, price = %p.price, "bought"),
            Err(err) => warn!(property, player, %err, "purchase rejected"),
        }
    }
    for (property, spec) in &args.upgrades {
        let id = EntityId::property(*property);
        // PATH or PATH:UPGRADE_ID
        let ordered = match spec.split_once(':') {
            Some((path, upgrade)) => game.upgrade_property_to(id, path, upgrade),
            None => game.upgrade_property(id, spec),
        };
        match ordered {
            Ok(u) => info!(property, upgrade = %u.id, completes = %u.completion_date(), "upgrade ordered"),
            Err(err) => warn!(property, upgrade = %spec, %err, "upgrade rejected"),
        }
    }
    for &property in &args.sales {
        match game.sell_property(EntityId::property(property)) {
            Ok(s) => info!(property = %s.property, seller = %s.seller, proceeds = %s.proceeds, "sold"),
            Err(err) => warn!(property, %err, "sale rejected"),
        }
    }
}

fn print_kpis(game: &Game) {
    let date = game
        .world()
        .clock()
        .map(|c| c.current_date().to_string())
        .unwrap_or_else(|| "-".into());
    println!(
        "KPI | ticks: {} | date: {} | months rolled: {} | rent credited: ${}",
        game.ticks(),
        date,
        game.months_rolled(),
        game.rent_total()
    );
    let world = game.world();
    for id in world.ids().into_iter().filter(|id| id.kind == EntityKind::Player) {
        let name = world.get::<Info>(id).map_or("?", |i| i.name.as_str());
        let funds = world.get::<Funds>(id).map_or(Decimal::ZERO, |f| f.amount);
        let owned = world.owned_by(id).len();
        println!("Player | {id} | {name} | funds: ${funds} | properties: {owned}");
    }
}

fn report(game: &Game, snapshot: bool) -> Result<()> {
    print_kpis(game);
    if snapshot {
        println!("{}", game.snapshot().to_json()?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args()?;
    info!(catalog = ?args.catalog, ticks = args.ticks, interval_ms = ?args.interval_ms, "starting CLI");

    let catalog = Catalog::load(&args.catalog)
        .with_context(|| format!("loading {}", args.catalog.display()))?;
    let mut game = Game::from_catalog(&catalog)?;
    apply_actions(&mut game, &args);

    match args.interval_ms {
        Some(ms) => {
            let shared = SharedGame::new(game);
            let ran = run_ticker(shared.clone(), Duration::from_millis(ms), Some(args.ticks)).await?;
            info!(ran, "real-time run finished");
            shared.with(|g| report(g, args.snapshot))?
        }
        None => {
            game.run_ticks(args.ticks);
            report(&game, args.snapshot)
        }
    }
}
