// Copyright 2025- adalpc-rs developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Test signal generator module.
//!
//! This module is primarily intended to be used for tests. However, unlike
//! a module in `test_helper.rs`, this module is intended to be exposed to
//! the outside of the crate for external testing frameworks.

use rand::Rng;
use rand::SeedableRng;

/// Test signal generators.
pub trait Signal: std::fmt::Debug {
    /// Generates a signal from t=`sample_offset` and fills the buffer `dest`.
    fn fill_buffer(&self, sample_offset: usize, dest: &mut [f64]);

    /// Generates a signal and returns it as a `Vec`.
    fn to_vec(&self, len: usize) -> Vec<f64> {
        let mut ret = vec![0.0f64; len];
        self.fill_buffer(0, &mut ret);
        ret
    }

    /// Mixes seeded noise into the signal.
    fn noise_with_seed(self, seed0: u64, amplitude: f64) -> Mix<Self, Noise>
    where
        Self: Sized,
    {
        self.mix(Noise::with_seed(seed0, amplitude))
    }

    /// Mixes signal from the other generator.
    fn mix<T: Signal + Sized>(self, other: T) -> Mix<Self, T>
    where
        Self: Sized,
    {
        Mix::new(1.0, self, 1.0, other)
    }
}

/// Generator for constant signals.
#[derive(Clone, Debug)]
pub struct Dc {
    offset: f64,
}

impl Dc {
    /// Constructs new `Dc` signal.
    pub fn new(offset: f64) -> Self {
        Self { offset }
    }
}

impl Signal for Dc {
    fn fill_buffer(&self, _offset: usize, dest: &mut [f64]) {
        for p in dest {
            *p = self.offset;
        }
    }
}

/// Generator for a sinusoidal wave.
#[derive(Clone, Debug)]
pub struct Sine {
    period: usize,
    amplitude: f64,
}

impl Sine {
    /// Constructs new sine wave signal with `period` and `amplitude`.
    pub fn new(period: usize, amplitude: f64) -> Self {
        Self { period, amplitude }
    }
}

impl Signal for Sine {
    fn fill_buffer(&self, offset: usize, dest: &mut [f64]) {
        let period = self.period as f64;
        for (t, p) in dest.iter_mut().enumerate() {
            let t = (t + offset) as f64;
            *p = self.amplitude * f64::sin(2.0 * std::f64::consts::PI * t / period);
        }
    }
}

/// Generator for a uniform random white noise.
#[derive(Clone, Debug)]
pub struct Noise {
    seed0: u64,
    amplitude: f64,
}

impl Noise {
    /// Constructs new noise generator with specifying a seed.
    pub fn with_seed(seed0: u64, amplitude: f64) -> Self {
        Self { seed0, amplitude }
    }
}

impl Signal for Noise {
    /// Fills buffer with the uniform random values.
    ///
    /// # Note
    ///
    /// This method doesn't ensure reproducibility if it is called in an
    /// arbitrary order, e.g.
    /// `noise.fill_buffer(0, &mut dest[..])` generate different results from
    /// `noise.fill_buffer(0, &mut dest[0..10])` and
    /// `noise.fill_buffer(10, &mut dest[10..])`.
    fn fill_buffer(&self, offset: usize, dest: &mut [f64]) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed0.wrapping_add(offset as u64));
        for p in dest {
            *p = self.amplitude * 2.0 * (rng.sample::<f64, _>(rand::distributions::Open01) - 0.5);
        }
    }
}

/// Generator for an autoregressive process driven by seeded white noise.
///
/// Each sample is `sum(taps[i] * x[t - 1 - i]) + noise[t]`; the generator
/// replays the process from t=0 on every call, so overlapping requests
/// observe one consistent realization.
#[derive(Clone, Debug)]
pub struct AutoRegressive {
    taps: Vec<f64>,
    noise_amplitude: f64,
    seed0: u64,
}

impl AutoRegressive {
    /// Constructs the process with the given feedback taps.
    pub fn new(taps: &[f64], noise_amplitude: f64, seed0: u64) -> Self {
        Self {
            taps: taps.to_vec(),
            noise_amplitude,
            seed0,
        }
    }
}

impl Signal for AutoRegressive {
    fn fill_buffer(&self, offset: usize, dest: &mut [f64]) {
        let total = offset + dest.len();
        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed0);
        let mut history = vec![0.0f64; total];
        for t in 0..total {
            let mut v = self.noise_amplitude
                * 2.0
                * (rng.sample::<f64, _>(rand::distributions::Open01) - 0.5);
            for (i, tap) in self.taps.iter().enumerate() {
                if t > i {
                    v += tap * history[t - 1 - i];
                }
            }
            history[t] = v;
        }
        dest.copy_from_slice(&history[offset..]);
    }
}

/// Decorator that mixes outputs from the inner generators.
#[derive(Clone, Debug)]
pub struct Mix<T1: Signal + Sized, T2: Signal + Sized> {
    weight1: f64,
    weight2: f64,
    signal1: T1,
    signal2: T2,
}

impl<T1: Signal + Sized, T2: Signal + Sized> Mix<T1, T2> {
    /// Constructs new two-inputs mixer.
    pub fn new(weight1: f64, signal1: T1, weight2: f64, signal2: T2) -> Self {
        Self {
            weight1,
            weight2,
            signal1,
            signal2,
        }
    }
}

impl<T1: Signal + Sized, T2: Signal + Sized> Signal for Mix<T1, T2> {
    fn fill_buffer(&self, offset: usize, dest: &mut [f64]) {
        for p in &mut *dest {
            *p = 0.0f64;
        }

        let mut buf = vec![0.0f64; dest.len()];
        self.signal1.fill_buffer(offset, &mut buf);
        for (p, x) in dest.iter_mut().zip(buf.iter()) {
            *p += self.weight1 * *x;
        }
        self.signal2.fill_buffer(offset, &mut buf);
        for (p, x) in dest.iter_mut().zip(buf.iter()) {
            *p += self.weight2 * *x;
        }
    }
}
