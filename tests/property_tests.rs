//! Property-based tests using proptest.
//!
//! Invariants that must hold across random inputs: the solver inverts the
//! pricer, prices rise with vol, Merton without jumps is Black-Scholes and a
//! surface never holds the same (strike, expiry) twice.

use proptest::prelude::*;
use smile_models::config::MertonSeriesConfig;
use smile_models::models::black_scholes;
use smile_models::prelude::*;

fn option_type() -> impl Strategy<Value = OptionType> {
    prop_oneof![Just(OptionType::Call), Just(OptionType::Put)]
}

// --- Property Test 1: IV round trip ---

proptest! {
    /// implied_vol(price(σ)) recovers σ wherever the price carries enough
    /// vega to pin it down.
    #[test]
    fn iv_round_trip(
        strike in 70.0_f64..140.0,
        time in 0.05_f64..3.0,
        vol in 0.05_f64..1.5,
        rate in -0.01_f64..0.08,
        div in 0.0_f64..0.04,
        option_type in option_type(),
    ) {
        let spot = 100.0;
        let price = black_scholes::price(spot, strike, time, vol, rate, div, option_type).unwrap();
        let vega = black_scholes::greeks(spot, strike, time, vol, rate, div, option_type).unwrap().vega;
        prop_assume!(vega > 0.05);

        let iv = implied_vol(price, spot, strike, time, rate, div, option_type).unwrap();
        prop_assert!((iv - vol).abs() < 1e-4, "vol {} recovered as {}", vol, iv);
    }
}

proptest! {
    /// Far OTM calls are worth almost nothing and carry almost no vega, yet
    /// their vol is still recovered and never collapses to the bracket floor.
    #[test]
    fn iv_round_trip_far_wing(
        strike in 120.0_f64..200.0,
        time in 0.01_f64..0.25,
        vol in 0.1_f64..0.6,
    ) {
        let price = black_scholes::price(100.0, strike, time, vol, 0.0, 0.0, OptionType::Call).unwrap();
        prop_assume!(price > 1e-100);

        let iv = implied_vol(price, 100.0, strike, time, 0.0, 0.0, OptionType::Call).unwrap();
        prop_assert!((iv - vol).abs() < 1e-4, "vol {} recovered as {} from price {:e}", vol, iv, price);
    }
}

// --- Property Test 2: price monotone in vol ---

proptest! {
    #[test]
    fn price_increases_with_vol(
        strike in 50.0_f64..200.0,
        time in 0.01_f64..5.0,
        vol in 0.01_f64..2.0,
        bump in 0.01_f64..0.5,
        option_type in option_type(),
    ) {
        let low = black_scholes::price(100.0, strike, time, vol, 0.03, 0.01, option_type).unwrap();
        let high = black_scholes::price(100.0, strike, time, vol + bump, 0.03, 0.01, option_type).unwrap();
        prop_assert!(high >= low, "{} at {} vs {} at {}", low, vol, high, vol + bump);
    }
}

// --- Property Test 3: Merton without jumps ---

proptest! {
    #[test]
    fn merton_zero_intensity_is_black_scholes(
        strike in 60.0_f64..150.0,
        sigma in 0.05_f64..1.0,
        mu_j in -0.5_f64..0.5,
        sigma_j in 0.0_f64..0.8,
        option_type in option_type(),
    ) {
        let ctx = MarketContext::new(100.0, 0.8, 0.04, 0.01);
        let model = MertonModel::new(
            MertonParams::new(sigma, 0.0, mu_j, sigma_j),
            ctx,
            &MertonSeriesConfig::default(),
        )
        .unwrap();
        let merton = model.price(strike, option_type).unwrap();
        let bs = black_scholes::price(100.0, strike, 0.8, sigma, 0.04, 0.01, option_type).unwrap();
        prop_assert_eq!(merton, bs);
    }
}

// --- Property Test 4: SABR vols stay positive ---

proptest! {
    #[test]
    fn sabr_vols_positive(
        alpha in 0.05_f64..0.6,
        rho in -0.9_f64..0.9,
        nu in 0.0_f64..1.5,
        strike in 70.0_f64..140.0,
    ) {
        let ctx = MarketContext::new(100.0, 0.5, 0.02, 0.0);
        let params = ModelParameters::Sabr(SabrParams::new(alpha, 1.0, rho, nu));
        let res = implied_vol_at(strike, &ctx, &params, &PricingConfig::default());
        prop_assert!(res.is_ok(), "strike {} failed: {:?}", strike, res);
        let iv = res.unwrap();
        prop_assert!(iv.is_finite() && iv > 0.0);
    }
}

// --- Property Test 5: surface keys are unique ---

proptest! {
    #[test]
    fn surface_has_unique_sorted_keys(
        strikes_a in prop::collection::vec(80u32..120, 1..15),
        strikes_b in prop::collection::vec(80u32..120, 1..15),
    ) {
        let smile = |time: f64, strikes: &[u32]| {
            ExpirySmile::new(time, 100.0, strikes.iter().map(|&k| (k as f64, 0.2)).collect())
        };
        let surface = build_surface(&[smile(0.5, &strikes_a[..]), smile(0.25, &strikes_b[..])]).unwrap();

        let mut distinct_a = strikes_a.clone();
        distinct_a.sort_unstable();
        distinct_a.dedup();
        let mut distinct_b = strikes_b.clone();
        distinct_b.sort_unstable();
        distinct_b.dedup();
        prop_assert_eq!(surface.len(), distinct_a.len() + distinct_b.len());

        let mut union = distinct_a.clone();
        union.extend(&distinct_b);
        union.sort_unstable();
        union.dedup();
        prop_assert_eq!(surface.num_strikes, union.len());

        for pair in surface.points.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(
                a.expiry < b.expiry || (a.expiry == b.expiry && a.strike < b.strike),
                "unsorted or duplicate at ({}, {}) -> ({}, {})",
                a.expiry, a.strike, b.expiry, b.strike
            );
        }
    }
}
