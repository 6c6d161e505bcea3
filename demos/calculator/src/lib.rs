//! Calculator module for plugbridge
//!
//! Build with `cargo build --release` in this directory, then:
//!
//! ```text
//! plugbridge run --module target/release/libcalculator.so "Calculator.Math.Add(1, 2)"
//! int: 3
//! ```

use plugbridge::module::ModuleBuilder;

/// Running total and the number of operations applied to it.
#[derive(Debug, Default)]
pub struct Accumulator {
    total: f64,
    steps: u32,
}

impl Accumulator {
    fn set(&mut self, value: f64) -> f64 {
        self.total = value;
        self.steps += 1;
        self.total
    }
}

fn register(module: &mut ModuleBuilder) {
    module
        .static_class("Calculator.Math")
        .static_method("Add", |a: i32, b: i32| a.checked_add(b).ok_or("overflow"))
        .static_method("Sub", |a: i32, b: i32| a.checked_sub(b).ok_or("overflow"))
        .static_method("Mul", |a: i32, b: i32| a.checked_mul(b).ok_or("overflow"))
        .static_method("Div", |a: i32, b: i32| a.checked_div(b).ok_or("division by zero"))
        .static_method("Sqrt", |x: f32| x.sqrt())
        .static_method("Hypot", |a: f64, b: f64| a.hypot(b))
        .static_method("Abs", |x: i64| x.unsigned_abs())
        .static_method("IsPrime", is_prime)
        .static_method("Describe", |x: i32| {
            if x % 2 == 0 {
                format!("{} is even", x)
            } else {
                format!("{} is odd", x)
            }
        });

    module
        .class::<Accumulator>("Calculator.Accumulator")
        .constructor(Accumulator::default)
        .method("Add", |acc: &mut Accumulator, x: f64| {
            let total = acc.total + x;
            acc.set(total)
        })
        .method("Mul", |acc: &mut Accumulator, x: f64| {
            let total = acc.total * x;
            acc.set(total)
        })
        .method("Reset", |acc: &mut Accumulator| *acc = Accumulator::default())
        .method("Total", |acc: &mut Accumulator| acc.total)
        .method("Steps", |acc: &mut Accumulator| acc.steps);
}

fn is_prime(n: u32) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2u32;
    while d.saturating_mul(d) <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}

plugbridge::export_module!(register);
