use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// All simulation scalars (money, load, heat, capacity, energy,
/// patience) use this type so two runs with the same seed agree
/// bit-for-bit on every platform.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Game time in milliseconds. Advances only while the sim runs, scaled
/// by the session time scale.
pub type Millis = u64;

/// Fixed simulation timestep.
pub const TICK_MS: Millis = 50;

/// One game hour lasts one minute of game time.
pub const MS_PER_GAME_HOUR: Millis = 60_000;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display/FFI, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Seconds covered by one tick, as a fixed-point scalar.
#[inline]
pub fn tick_seconds() -> Fixed64 {
    Fixed64::from_num(TICK_MS) / Fixed64::from_num(1000)
}

/// Hour of the game day in [0, 24).
#[inline]
pub fn hour_of_day(game_time: Millis) -> u64 {
    (game_time / MS_PER_GAME_HOUR) % 24
}

/// Sine over whole turns (1 turn = 2π radians), Bhaskara I approximation.
///
/// Output is in [-1, 1] with absolute error under 0.002 — plenty for
/// demand oscillation — and stays entirely in fixed-point arithmetic.
pub fn sine_turns(turns: Fixed64) -> Fixed64 {
    let mut u = turns.frac();
    if u < Fixed64::ZERO {
        u += Fixed64::ONE;
    }
    let half = Fixed64::from_num(0.5);
    let (t, negate) = if u >= half {
        ((u - half) * Fixed64::from_num(2), true)
    } else {
        (u * Fixed64::from_num(2), false)
    };
    // sin(pi*t) ~= 16t(1-t) / (5 - 4t(1-t)) for t in [0, 1]
    let k = t * (Fixed64::ONE - t);
    let s = (Fixed64::from_num(16) * k) / (Fixed64::from_num(5) - Fixed64::from_num(4) * k);
    if negate { -s } else { s }
}

/// Sine mapped to [0, 1]: `(sin + 1) / 2`.
#[inline]
pub fn unit_wave(turns: Fixed64) -> Fixed64 {
    (sine_turns(turns) + Fixed64::ONE) / Fixed64::from_num(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_seconds_is_fiftieth() {
        let s = tick_seconds();
        assert!((fixed64_to_f64(s) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn hour_of_day_wraps() {
        assert_eq!(hour_of_day(0), 0);
        assert_eq!(hour_of_day(6 * MS_PER_GAME_HOUR), 6);
        assert_eq!(hour_of_day(24 * MS_PER_GAME_HOUR), 0);
        assert_eq!(hour_of_day(25 * MS_PER_GAME_HOUR + 1), 1);
    }

    #[test]
    fn sine_quarter_points() {
        assert_eq!(sine_turns(Fixed64::ZERO), Fixed64::ZERO);
        let quarter = sine_turns(f64_to_fixed64(0.25));
        assert!((fixed64_to_f64(quarter) - 1.0).abs() < 0.01);
        let three_quarter = sine_turns(f64_to_fixed64(0.75));
        assert!((fixed64_to_f64(three_quarter) + 1.0).abs() < 0.01);
    }

    #[test]
    fn sine_matches_reference() {
        for i in 0..100 {
            let turns = i as f64 / 100.0;
            let approx = fixed64_to_f64(sine_turns(f64_to_fixed64(turns)));
            let exact = (turns * std::f64::consts::TAU).sin();
            assert!(
                (approx - exact).abs() < 0.002,
                "turns={turns}: {approx} vs {exact}"
            );
        }
    }

    #[test]
    fn sine_negative_input_wraps() {
        let a = sine_turns(f64_to_fixed64(-0.25));
        let b = sine_turns(f64_to_fixed64(0.75));
        assert_eq!(a, b);
    }

    #[test]
    fn unit_wave_bounds() {
        for i in 0..50 {
            let w = unit_wave(f64_to_fixed64(i as f64 / 50.0));
            assert!(w >= Fixed64::ZERO && w <= Fixed64::ONE);
        }
    }
}
