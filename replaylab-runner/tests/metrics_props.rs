use chrono::NaiveDate;
use proptest::prelude::*;
use replaylab_core::domain::{Side, Trade};
use replaylab_runner::metrics::{max_drawdown, volatility, win_rate};

fn equity_curve() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(prop_oneof![Just(0.0), 1.0f64..1e7], 0..200)
}

fn trades() -> impl Strategy<Value = Vec<Trade>> {
    prop::collection::vec((0u32..20, any::<bool>(), 1.0f64..50.0, 0usize..3), 0..40).prop_map(
        |raw| {
            raw.into_iter()
                .map(|(day, is_buy, price, sym)| Trade {
                    timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                        .unwrap()
                        .and_hms_opt(0, 0, 0)
                        .unwrap()
                        + chrono::Duration::days(day as i64),
                    symbol: ["A", "B", "C"][sym].to_string(),
                    side: if is_buy { Side::Buy } else { Side::Sell },
                    quantity: 100,
                    price,
                    amount: price * 100.0,
                    commission: price * 100.0 * 0.0003,
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn drawdown_is_bounded(eq in equity_curve()) {
        let dd = max_drawdown(&eq);
        prop_assert!((-1.0..=0.0).contains(&dd), "drawdown {dd} out of bounds");
    }

    #[test]
    fn volatility_is_non_negative(eq in equity_curve()) {
        prop_assert!(volatility(&eq) >= 0.0);
    }

    #[test]
    fn win_rate_is_a_fraction(ledger in trades()) {
        let w = win_rate(&ledger);
        prop_assert!((0.0..=1.0).contains(&w));
    }
}
