//! Smile Models CLI
//!
//! Without arguments, runs a Black-Scholes and implied vol demo.
//! With a JSON snapshot path, compares the requested models on every expiry
//! of the snapshot and prints the comparisons and the market surface as JSON.
//!
//! Set `RUST_LOG=smile_models=debug` to see calibration progress.

use std::fs::File;
use std::io::BufReader;

use serde::{Deserialize, Serialize};

use smile_models::models::black_scholes;
use smile_models::prelude::*;

/// Quotes snapshot prepared by a data collaborator
#[derive(Debug, Deserialize)]
struct Snapshot {
    symbol: String,
    #[serde(default = "default_models")]
    models: Vec<ModelKind>,
    #[serde(default)]
    config: EngineConfig,
    expiries: Vec<ExpiryQuotes>,
}

fn default_models() -> Vec<ModelKind> {
    ModelKind::ALL.to_vec()
}

#[derive(Debug, Serialize)]
struct Report {
    symbol: String,
    comparisons: Vec<VolSmileComparison>,
    failed_expiries: Vec<String>,
    surface: Option<VolSurface>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::level_filters::LevelFilter::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match std::env::args().nth(1) {
        Some(path) => {
            if let Err(e) = run_snapshot(&path) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        None => demo(),
    }
}

fn run_snapshot(path: &str) -> VolResult<()> {
    let reader = BufReader::new(File::open(path)?);
    let snapshot: Snapshot =
        serde_json::from_reader(reader).map_err(|e| VolError::Serialization(e.to_string()))?;
    snapshot.config.validate()?;

    tracing::info!(
        "Loaded {} with {} expiries, models {:?}",
        snapshot.symbol,
        snapshot.expiries.len(),
        snapshot.models
    );

    let results = compare_expiries(
        &snapshot.symbol,
        &snapshot.expiries,
        &snapshot.models,
        &snapshot.config,
    );

    let mut comparisons = Vec::new();
    let mut failed_expiries = Vec::new();
    for (expiry, result) in snapshot.expiries.iter().zip(results) {
        match result {
            Ok(cmp) => comparisons.push(cmp),
            Err(e) => {
                tracing::warn!("Expiry T={} failed: {}", expiry.context.time_to_expiry, e);
                failed_expiries.push(format!("T={}: {}", expiry.context.time_to_expiry, e));
            }
        }
    }

    let surface = if comparisons.iter().any(|c| !c.data_points.is_empty()) {
        let surface = surface_from_comparisons(&comparisons)?;
        Some(surface.with_moneyness_grid(&snapshot.config.surface)?)
    } else {
        None
    };

    let report = Report {
        symbol: snapshot.symbol,
        comparisons,
        failed_expiries,
        surface,
    };
    let json = serde_json::to_string_pretty(&report).map_err(|e| VolError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

fn demo() {
    println!("Smile Models");
    println!("============\n");

    let spot = 100.0;
    let strike = 105.0;
    let time = 1.0;
    let rate = 0.05;
    let div = 0.0;
    let vol = 0.20;

    println!("Black-Scholes Pricing Example:");
    println!("  Spot: ${:.2}", spot);
    println!("  Strike: ${:.2}", strike);
    println!("  Time: {:.2} years", time);
    println!("  Rate: {:.1}%", rate * 100.0);
    println!("  Vol: {:.1}%\n", vol * 100.0);

    let (call_price, put_price) = match (
        black_scholes::price(spot, strike, time, vol, rate, div, OptionType::Call),
        black_scholes::price(spot, strike, time, vol, rate, div, OptionType::Put),
    ) {
        (Ok(c), Ok(p)) => (c, p),
        (Err(e), _) | (_, Err(e)) => {
            println!("  Pricing failed: {}", e);
            return;
        }
    };

    println!("Option Prices:");
    println!("  Call: ${:.4}", call_price);
    println!("  Put: ${:.4}", put_price);

    if let Ok(greeks) = black_scholes::greeks(spot, strike, time, vol, rate, div, OptionType::Call) {
        println!("\nCall Greeks:");
        println!("  Delta: {:.4}", greeks.delta);
        println!("  Gamma: {:.6}", greeks.gamma);
        println!("  Theta: {:.4} per day", greeks.theta_per_day());
        println!("  Vega: {:.4} per vol point", greeks.vega_pct());
        println!("  Rho: {:.4}", greeks.rho);
    }

    println!("\nImplied Volatility Solver:");
    match implied_vol(call_price, spot, strike, time, rate, div, OptionType::Call) {
        Ok(iv) => println!("  Recovered IV: {:.4}% (expected: {:.2}%)", iv * 100.0, vol * 100.0),
        Err(e) => println!("  IV solve failed: {}", e),
    }

    println!("\nModel smiles at default parameters (T={:.2}):", time);
    let ctx = MarketContext::new(spot, time, rate, div);
    let strikes = [80.0, 90.0, 100.0, 110.0, 120.0];
    let pricing = PricingConfig::default();
    for kind in ModelKind::ALL {
        let params = ModelParameters::default_for(kind);
        match smile_vols(&strikes, &ctx, &params, &pricing) {
            Ok(vols) => {
                let row: Vec<String> = vols
                    .iter()
                    .map(|v| match v {
                        Ok(iv) => format!("{:6.2}%", iv * 100.0),
                        Err(_) => "   n/a ".to_string(),
                    })
                    .collect();
                println!("  {:<14} {}", kind.name(), row.join(" "));
            }
            Err(e) => println!("  {:<14} failed: {}", kind.name(), e),
        }
    }

    println!("\nPass a JSON snapshot path to run a model comparison.");
}
