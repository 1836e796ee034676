//! The tick scheduler (§4.10): credits virtual cycles to every registered
//! peripheral between instructions and exposes monotonic virtual time.
//! Also models the debugger's named-ticker facility, a small set of
//! user-configurable counters independent of any one peripheral.

use std::collections::HashMap;

pub struct TickScheduler {
    xtal_hz: f64,
    clock_per_cycle: u32,
    accumulated_cycles: u64,
    tickers: HashMap<String, Ticker>,
    next_numeric_id: i64,
}

impl TickScheduler {
    #[must_use]
    pub fn new(xtal_hz: f64, clock_per_cycle: u32) -> Self {
        Self {
            xtal_hz,
            clock_per_cycle,
            accumulated_cycles: 0,
            tickers: HashMap::new(),
            next_numeric_id: 0,
        }
    }

    #[must_use]
    pub fn xtal_hz(&self) -> f64 {
        self.xtal_hz
    }

    pub fn set_xtal_hz(&mut self, hz: f64) {
        self.xtal_hz = hz;
    }

    #[must_use]
    pub fn clock_per_cycle(&self) -> u32 {
        self.clock_per_cycle
    }

    /// Credits `cycles` virtual cycles and returns the new `rtime` in
    /// seconds (§4.10: `rtime = cycles_elapsed / (xtal / clock_per_cycle)`,
    /// monotonic by construction since `accumulated_cycles` only grows).
    pub fn credit(&mut self, cycles: u64) -> f64 {
        self.accumulated_cycles += cycles;
        self.rtime()
    }

    #[must_use]
    pub fn rtime(&self) -> f64 {
        if self.xtal_hz <= 0.0 {
            return 0.0;
        }
        let effective_hz = self.xtal_hz / f64::from(self.clock_per_cycle.max(1));
        self.accumulated_cycles as f64 / effective_hz
    }

    pub fn reset_time(&mut self) {
        self.accumulated_cycles = 0;
    }

    // ---- Named tickers (§4.10, §6 `timer` command, SPEC_FULL §F.5) -------

    pub fn add_ticker(&mut self, spec: TickerSpec) -> String {
        let name = spec.name.clone();
        self.tickers.insert(
            name.clone(),
            Ticker {
                name: name.clone(),
                direction: spec.direction,
                frequency: spec.frequency,
                filter: spec.filter,
                running: true,
                ticks: 0,
            },
        );
        name
    }

    #[must_use]
    pub fn next_numeric_id(&mut self) -> i64 {
        let id = self.next_numeric_id;
        self.next_numeric_id += 1;
        id
    }

    pub fn delete_ticker(&mut self, name: &str) -> bool {
        self.tickers.remove(name).is_some()
    }

    #[must_use]
    pub fn ticker(&self, name: &str) -> Option<&Ticker> {
        self.tickers.get(name)
    }

    pub fn start_ticker(&mut self, name: &str) -> bool {
        self.tickers.get_mut(name).is_some_and(|t| {
            t.running = true;
            true
        })
    }

    pub fn stop_ticker(&mut self, name: &str) -> bool {
        self.tickers.get_mut(name).is_some_and(|t| {
            t.running = false;
            true
        })
    }

    pub fn set_ticker_ticks(&mut self, name: &str, ticks: i64) -> bool {
        self.tickers.get_mut(name).is_some_and(|t| {
            t.ticks = ticks;
            true
        })
    }

    pub fn set_ticker_time(&mut self, name: &str, seconds: f64) -> bool {
        self.tickers.get_mut(name).is_some_and(|t| {
            t.ticks = (seconds * t.frequency) as i64;
            true
        })
    }

    /// Advances every running ticker by `cycles`, gated by its filter
    /// (§4.10: "count only while in CPU state S, or only while in-ISR").
    /// `current_state` is supplied by the excluded CPU core each time it
    /// credits cycles.
    pub fn advance_tickers(&mut self, cycles: u64, current_state: &CpuStateSample) {
        for ticker in self.tickers.values_mut() {
            if !ticker.running {
                continue;
            }
            if !ticker.filter.matches(current_state) {
                continue;
            }
            let delta = cycles as i64;
            match ticker.direction {
                TickerDirection::Increment => ticker.ticks += delta,
                TickerDirection::Decrement => ticker.ticks -= delta,
            }
        }
    }
}

/// What the CPU was doing during the credited cycles, consulted by a
/// ticker's optional filter. The excluded CPU core is the only producer
/// of this value; named CPU states beyond halt/in-isr/main are carried
/// as opaque strings so chip-specific state names need no core changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuStateSample {
    Halt,
    InIsr,
    Main,
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerDirection {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickerFilter {
    None,
    InIsr,
    CpuState(String),
}

impl TickerFilter {
    #[must_use]
    pub fn matches(&self, sample: &CpuStateSample) -> bool {
        match self {
            TickerFilter::None => true,
            TickerFilter::InIsr => matches!(sample, CpuStateSample::InIsr),
            TickerFilter::CpuState(name) => match sample {
                CpuStateSample::Halt => name == "halt",
                CpuStateSample::InIsr => name == "inisr" || name == "isr",
                CpuStateSample::Main => name == "main",
                CpuStateSample::Named(n) => n == name,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ticker {
    pub name: String,
    pub direction: TickerDirection,
    /// Conversion factor between ticks and seconds (§6 `time <seconds>`).
    pub frequency: f64,
    pub filter: TickerFilter,
    pub running: bool,
    pub ticks: i64,
}

/// The value type the (excluded) `timer add` command line parser builds,
/// covering both the historical and modern syntaxes (SPEC_FULL §F.5).
#[derive(Debug, Clone)]
pub struct TickerSpec {
    pub name: String,
    pub direction: TickerDirection,
    pub frequency: f64,
    pub filter: TickerFilter,
}

impl TickerSpec {
    /// `timer add <id> <step> [isr-flag]` — the original historical form:
    /// frequency defaults to 1 Hz (raw cycle counting), direction is
    /// always increment, and `isr_flag` maps to the in-ISR filter.
    #[must_use]
    pub fn historical(id: i64, step: i64, isr_flag: bool) -> Self {
        Self {
            name: id.to_string(),
            direction: if step < 0 {
                TickerDirection::Decrement
            } else {
                TickerDirection::Increment
            },
            frequency: 1.0,
            filter: if isr_flag { TickerFilter::InIsr } else { TickerFilter::None },
        }
    }

    /// `timer add <id> [state|step] [rtime] [freq N] [step N] [up|down|inc|dec]`
    /// — the modern keyworded form.
    #[must_use]
    pub fn modern(
        name: impl Into<String>,
        state: Option<TickerFilter>,
        freq: Option<f64>,
        direction: TickerDirection,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            frequency: freq.unwrap_or(1.0),
            filter: state.unwrap_or(TickerFilter::None),
        }
    }
}
