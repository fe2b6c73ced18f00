//! Sleep, randomness, time and numeric helpers

use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::context::ExecContext;

use super::context;

/// Longest single sleep between stop checks
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Functions selectable from the `math` block's dropdown
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Sqrt = 0,
    Round = 1,
    Floor = 2,
    Ceil = 3,
    Sin = 4,
    Cos = 5,
    Tan = 6,
    Asin = 7,
    Acos = 8,
    Atan = 9,
    Ln = 10,
    Log10 = 11,
    Abs = 12,
    Exp = 13,
}

impl MathOp {
    pub const ALL: [Self; 14] = [
        Self::Sqrt,
        Self::Round,
        Self::Floor,
        Self::Ceil,
        Self::Sin,
        Self::Cos,
        Self::Tan,
        Self::Asin,
        Self::Acos,
        Self::Atan,
        Self::Ln,
        Self::Log10,
        Self::Abs,
        Self::Exp,
    ];

    /// Dropdown label
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqrt => "sqrt",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Ln => "ln",
            Self::Log10 => "log10",
            Self::Abs => "abs",
            Self::Exp => "exp",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    #[must_use]
    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Sqrt => x.sqrt(),
            Self::Round => x.round(),
            Self::Floor => x.floor(),
            Self::Ceil => x.ceil(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
            Self::Asin => x.asin(),
            Self::Acos => x.acos(),
            Self::Atan => x.atan(),
            Self::Ln => x.ln(),
            Self::Log10 => x.log10(),
            Self::Abs => x.abs(),
            Self::Exp => x.exp(),
        }
    }
}

/// Sleep for `usecs` microseconds, waking early when a stop is requested
///
/// Returns the requested duration, or 0 for negative input or an
/// interrupted sleep.
///
/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_sleep(ctx: *mut ExecContext, usecs: i64) -> i64 {
    let Ok(micros) = u64::try_from(usecs) else {
        return 0;
    };
    let ctx = context(ctx);
    let deadline = Instant::now() + Duration::from_micros(micros);
    loop {
        if ctx.should_exit() {
            return 0;
        }
        let now = Instant::now();
        if now >= deadline {
            return usecs;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_random(ctx: *mut ExecContext, min: i64, max: i64) -> i64 {
    context(ctx).random_range(min, max)
}

/// Seconds since the Unix epoch
#[no_mangle]
pub extern "C" fn scrap_unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}

/// Integer power by squaring; wraps on overflow, 0 for negative exponents
#[no_mangle]
pub extern "C" fn scrap_int_pow(base: i64, exponent: i64) -> i64 {
    if exponent < 0 {
        return 0;
    }
    let (mut base, mut exponent, mut result) = (base, exponent, 1i64);
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = result.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exponent >>= 1;
    }
    result
}

#[no_mangle]
pub extern "C" fn scrap_float_pow(base: f64, exponent: f64) -> f64 {
    base.powf(exponent)
}

#[no_mangle]
pub extern "C" fn scrap_float_rem(left: f64, right: f64) -> f64 {
    left % right
}

/// Apply the `math` block function with dropdown index `op`; NaN when unknown
#[no_mangle]
pub extern "C" fn scrap_math(op: i64, x: f64) -> f64 {
    MathOp::from_index(op).map_or(f64::NAN, |op| op.apply(x))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::gc::Gc;

    #[test]
    fn int_pow_by_squaring() {
        assert_eq!(scrap_int_pow(2, 10), 1024);
        assert_eq!(scrap_int_pow(-3, 3), -27);
        assert_eq!(scrap_int_pow(7, 0), 1);
        assert_eq!(scrap_int_pow(2, -1), 0);
        assert_eq!(scrap_int_pow(2, 64), 0);
    }

    #[test]
    fn float_helpers() {
        assert!((scrap_float_pow(2.0, 0.5) - std::f64::consts::SQRT_2).abs() < 1e-12);
        assert!((scrap_float_rem(7.5, 2.0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn math_ops_by_name_and_index() {
        assert_eq!(MathOp::from_name("floor"), Some(MathOp::Floor));
        assert_eq!(MathOp::from_name("cbrt"), None);
        assert_eq!(MathOp::from_index(MathOp::Abs as i64), Some(MathOp::Abs));
        assert!((scrap_math(MathOp::Sqrt as i64, 16.0) - 4.0).abs() < 1e-12);
        assert!((scrap_math(MathOp::Round as i64, 2.5) - 3.0).abs() < 1e-12);
        assert!(scrap_math(99, 1.0).is_nan());
        for op in MathOp::ALL {
            assert_eq!(MathOp::from_name(op.name()), Some(op));
        }
    }

    #[test]
    fn sleep_rejects_negative_and_honours_stop() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut ctx = ExecContext::new(Gc::new(4096, 1 << 20), Arc::clone(&stop));
        let ctx_ptr: *mut ExecContext = &mut ctx;
        unsafe {
            assert_eq!(scrap_sleep(ctx_ptr, -5), 0);
            assert_eq!(scrap_sleep(ctx_ptr, 1000), 1000);

            stop.store(true, Ordering::Relaxed);
            let started = Instant::now();
            assert_eq!(scrap_sleep(ctx_ptr, 10_000_000), 0);
            assert!(started.elapsed() < Duration::from_secs(1));
        }
    }

    #[test]
    fn unix_time_is_recent() {
        assert!(scrap_unix_time() > 1_600_000_000);
    }
}
