use std::f32::consts::{FRAC_PI_2, PI, TAU};

/// A closed range of field values.
///
/// Every operation returns bounds containing all values the matching
/// float operation can produce on inputs drawn from the operands.
/// Rounding modes are left untouched, so bounds can be off by a few ulps
/// in the tight direction.
///
/// `[NaN, NaN]` is the poisoned interval, standing in for any result
/// with an undefined bound.
#[derive(Copy, Clone, PartialEq)]
pub struct Interval {
    lower: f32,
    upper: f32,
}

impl std::fmt::Debug for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

impl Interval {
    /// Builds an interval from ordered bounds
    ///
    /// # Panics
    /// Panics if `lower > upper`, unless both bounds are NaN (the
    /// poisoned interval).
    #[inline]
    pub fn new(lower: f32, upper: f32) -> Self {
        assert!(
            upper >= lower || (lower.is_nan() && upper.is_nan()),
            "interval bounds out of order: [{lower}, {upper}]"
        );
        Self { lower, upper }
    }

    /// Returns the lower bound
    #[inline]
    pub fn lower(&self) -> f32 {
        self.lower
    }

    /// Returns the upper bound
    #[inline]
    pub fn upper(&self) -> f32 {
        self.upper
    }

    /// Checks whether `v` lies within the bounds
    #[inline]
    pub fn contains(&self, v: f32) -> bool {
        v >= self.lower && v <= self.upper
    }

    /// Checks for the poisoned interval (or any NaN bound)
    #[inline]
    pub fn has_nan(&self) -> bool {
        self.lower.is_nan() || self.upper.is_nan()
    }

    /// Tightest interval containing all of the given values
    ///
    /// NaN entries are skipped unless every entry is NaN.
    fn hull(vs: [f32; 4]) -> Self {
        let mut lower = vs[0];
        let mut upper = vs[0];
        for v in vs {
            lower = lower.min(v);
            upper = upper.max(v);
        }
        Interval::new(lower, upper)
    }

    /// Absolute value
    pub fn abs(self) -> Self {
        if self.has_nan() {
            f32::NAN.into()
        } else if self.upper <= 0.0 {
            -self
        } else if self.lower >= 0.0 {
            self
        } else {
            Interval::new(0.0, (-self.lower).max(self.upper))
        }
    }

    /// Squaring, tighter than `self * self` because both factors are the
    /// same value
    pub fn square(self) -> Self {
        if self.has_nan() {
            return f32::NAN.into();
        }
        let a = self.abs();
        Interval::new(a.lower * a.lower, a.upper * a.upper)
    }

    /// Square root
    ///
    /// A range crossing zero has its lower bound clamped to zero; a range
    /// entirely below zero is poisoned.
    pub fn sqrt(self) -> Self {
        if self.upper < 0.0 || self.has_nan() {
            f32::NAN.into()
        } else {
            Interval::new(self.lower.max(0.0).sqrt(), self.upper.sqrt())
        }
    }

    /// Reciprocal; poisoned if the range includes zero
    pub fn recip(self) -> Self {
        if self.has_nan() || self.contains(0.0) {
            f32::NAN.into()
        } else {
            Interval::new(1.0 / self.upper, 1.0 / self.lower)
        }
    }

    /// Checks whether the range covers an angle congruent to `theta`
    /// (mod 2*pi)
    ///
    /// Slightly widened, so that near misses count as hits; callers use
    /// this to decide when a trig extremum lies inside the range, and
    /// widening only ever loosens their bounds.
    fn covers_angle(self, theta: f32) -> bool {
        const SLACK: f32 = 1e-5;
        let k = ((self.lower - SLACK - theta) / TAU).ceil();
        theta + k * TAU <= self.upper + SLACK
    }

    /// Checks whether the range is too wide (or too far from zero) for
    /// angle bookkeeping to be trustworthy in single precision
    fn angle_overflow(self) -> bool {
        self.upper - self.lower >= TAU
            || self.lower.abs() >= 1e4
            || self.upper.abs() >= 1e4
    }

    /// Sine
    ///
    /// Away from its extrema the sine is monotone, so the bound is the
    /// endpoint values, stretched to -1 or 1 whenever the range covers a
    /// trough or a crest.
    pub fn sin(self) -> Self {
        if self.has_nan() {
            return f32::NAN.into();
        }
        if self.angle_overflow() {
            return Interval::new(-1.0, 1.0);
        }
        let a = self.lower.sin();
        let b = self.upper.sin();
        let lower = if self.covers_angle(-FRAC_PI_2) {
            -1.0
        } else {
            a.min(b)
        };
        let upper = if self.covers_angle(FRAC_PI_2) {
            1.0
        } else {
            a.max(b)
        };
        Interval::new(lower, upper)
    }

    /// Cosine; same strategy as [`sin`](Self::sin), with the extrema at
    /// 0 and pi
    pub fn cos(self) -> Self {
        if self.has_nan() {
            return f32::NAN.into();
        }
        if self.angle_overflow() {
            return Interval::new(-1.0, 1.0);
        }
        let a = self.lower.cos();
        let b = self.upper.cos();
        let lower = if self.covers_angle(PI) { -1.0 } else { a.min(b) };
        let upper = if self.covers_angle(0.0) { 1.0 } else { a.max(b) };
        Interval::new(lower, upper)
    }

    /// Tangent; poisoned if the range spans an asymptote
    pub fn tan(self) -> Self {
        if self.has_nan() {
            return f32::NAN.into();
        }
        // Index of the branch containing each endpoint; differing
        // indices mean an asymptote sits between them.
        let branch = |v: f32| ((v - FRAC_PI_2) / PI).floor();
        let a = self.lower.tan();
        let b = self.upper.tan();
        if branch(self.lower) != branch(self.upper) || a > b {
            f32::NAN.into()
        } else {
            Interval::new(a, b)
        }
    }

    /// Arcsine; poisoned if any input falls outside [-1, 1]
    pub fn asin(self) -> Self {
        if self.lower < -1.0 || self.upper > 1.0 || self.has_nan() {
            f32::NAN.into()
        } else {
            Interval::new(self.lower.asin(), self.upper.asin())
        }
    }

    /// Arccosine (decreasing); poisoned if any input falls outside
    /// [-1, 1]
    pub fn acos(self) -> Self {
        if self.lower < -1.0 || self.upper > 1.0 || self.has_nan() {
            f32::NAN.into()
        } else {
            Interval::new(self.upper.acos(), self.lower.acos())
        }
    }

    /// Arctangent
    pub fn atan(self) -> Self {
        Interval::new(self.lower.atan(), self.upper.atan())
    }

    /// Exponential
    pub fn exp(self) -> Self {
        Interval::new(self.lower.exp(), self.upper.exp())
    }

    /// Pointwise minimum of two ranges
    pub fn min(self, rhs: Self) -> Self {
        if self.has_nan() || rhs.has_nan() {
            f32::NAN.into()
        } else {
            Interval::new(
                self.lower.min(rhs.lower),
                self.upper.min(rhs.upper),
            )
        }
    }

    /// Pointwise maximum of two ranges
    pub fn max(self, rhs: Self) -> Self {
        if self.has_nan() || rhs.has_nan() {
            f32::NAN.into()
        } else {
            Interval::new(
                self.lower.max(rhs.lower),
                self.upper.max(rhs.upper),
            )
        }
    }

    /// Four-quadrant arctangent, with `self` as `y`
    ///
    /// If the region touches the branch cut along the negative x axis,
    /// the result spans the full circle.  Otherwise the angle is monotone
    /// along each edge of the region, so the corner angles bound it.
    pub fn atan2(self, x: Self) -> Self {
        let y = self;
        if y.has_nan() || x.has_nan() {
            f32::NAN.into()
        } else if x.lower < 0.0 && y.contains(0.0) {
            Interval::new(-PI, PI)
        } else {
            Interval::hull([
                y.lower.atan2(x.lower),
                y.lower.atan2(x.upper),
                y.upper.atan2(x.lower),
                y.upper.atan2(x.upper),
            ])
        }
    }

    /// Raises the range to the power `n`, treated as a constant
    ///
    /// Integer exponents are handled exactly (including parity);
    /// fractional exponents follow the [`sqrt`](Self::sqrt) convention
    /// for negative inputs.
    pub fn pow(self, n: f32) -> Self {
        if self.has_nan() || n.is_nan() {
            return f32::NAN.into();
        }
        if n < 0.0 {
            return self.pow(-n).recip();
        }
        if n == 0.0 {
            return 1.0.into();
        }
        if n.fract() == 0.0 {
            let n = n as i32;
            let a = self.lower.powi(n);
            let b = self.upper.powi(n);
            if n % 2 == 1 {
                // Odd powers are monotone
                Interval::new(a, b)
            } else if self.lower >= 0.0 {
                Interval::new(a, b)
            } else if self.upper <= 0.0 {
                Interval::new(b, a)
            } else {
                Interval::new(0.0, a.max(b))
            }
        } else if self.lower >= 0.0 {
            Interval::new(self.lower.powf(n), self.upper.powf(n))
        } else if self.upper > 0.0 {
            Interval::new(0.0, self.upper.powf(n))
        } else {
            f32::NAN.into()
        }
    }

    /// Takes the `n`-th root of the range, with `n` treated as a
    /// constant
    ///
    /// Odd roots are defined across the whole number line; even roots
    /// follow the [`sqrt`](Self::sqrt) convention for negative inputs.
    pub fn nth_root(self, n: f32) -> Self {
        if self.has_nan() || n.is_nan() || n == 0.0 {
            return f32::NAN.into();
        }
        if n < 0.0 {
            return self.nth_root(-n).recip();
        }
        if n.fract() == 0.0 && (n as i32) % 2 == 1 {
            let root = |v: f32| v.signum() * v.abs().powf(1.0 / n);
            Interval::new(root(self.lower), root(self.upper))
        } else if self.lower >= 0.0 {
            Interval::new(
                self.lower.powf(1.0 / n),
                self.upper.powf(1.0 / n),
            )
        } else if self.upper > 0.0 {
            Interval::new(0.0, self.upper.powf(1.0 / n))
        } else {
            f32::NAN.into()
        }
    }

    /// Coarse bound on the least non-negative remainder
    ///
    /// The result is always `[0, |rhs|.upper]`; callers needing tight
    /// bounds around the discontinuities must refine this themselves.
    pub fn modulo(self, rhs: Self) -> Self {
        if self.has_nan() || rhs.has_nan() {
            f32::NAN.into()
        } else {
            Interval::new(0.0, rhs.abs().upper())
        }
    }

    /// Passes `self` through, substituting `rhs` if `self` is poisoned
    pub fn nanfill(self, rhs: Self) -> Self {
        if self.has_nan() {
            rhs
        } else {
            self
        }
    }
}

impl From<f32> for Interval {
    #[inline]
    fn from(v: f32) -> Self {
        Interval::new(v, v)
    }
}

impl std::ops::Neg for Interval {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Interval::new(-self.upper, -self.lower)
    }
}

impl std::ops::Add<Interval> for Interval {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Interval::new(self.lower + rhs.lower, self.upper + rhs.upper)
    }
}

impl std::ops::Sub<Interval> for Interval {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Interval::new(self.lower - rhs.upper, self.upper - rhs.lower)
    }
}

impl std::ops::Mul<Interval> for Interval {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        if self.has_nan() || rhs.has_nan() {
            return f32::NAN.into();
        }
        Interval::hull([
            self.lower * rhs.lower,
            self.lower * rhs.upper,
            self.upper * rhs.lower,
            self.upper * rhs.upper,
        ])
    }
}

impl std::ops::Div<Interval> for Interval {
    type Output = Self;

    /// Division by a range straddling zero yields the whole number line
    fn div(self, rhs: Self) -> Self {
        if self.has_nan() || rhs.has_nan() {
            f32::NAN.into()
        } else if rhs.contains(0.0) {
            Interval::new(f32::NEG_INFINITY, f32::INFINITY)
        } else {
            Interval::hull([
                self.lower / rhs.lower,
                self.lower / rhs.upper,
                self.upper / rhs.lower,
                self.upper / rhs.upper,
            ])
        }
    }
}
