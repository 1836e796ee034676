//! VCD recorder (§4.11): output mode emits a value-change-dump stream from
//! writes to a set of watched (cell, bit-range) pairs; input mode parses a
//! previously recorded stream and drives cell writes at the recorded times.
//! Modeled as one [`Hw`] peripheral per `vcd[<id>]` instance (§6 "set
//! hardware vcd[<id>]"), matching the original's single `cl_vcd` class with
//! its `state`/`started`/`paused` fields re-expressed as a [`Mode`] sum type
//! (§9 "Deep inheritance").

use std::collections::VecDeque;
use std::fmt;

use ucsim_core::cell::WriteOrigin;
use ucsim_core::hw::{ConfigReg, Event, Hw, HwCategory, PeripheralId};
use ucsim_core::mcu::Mcu;
use ucsim_core::{CellRef, Word};

/// §7 item 4: malformed `$timescale`/`$var`, or (for input mode) an event
/// referencing a variable id the header never declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcdError {
    pub message: String,
}

impl VcdError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for VcdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vcd: {}", self.message)
    }
}

impl std::error::Error for VcdError {}

/// `$timescale` unit keywords (§6 "VCD format").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Fs,
    Ps,
    Ns,
    Us,
    Ms,
}

impl Unit {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Unit::Fs => "fs",
            Unit::Ps => "ps",
            Unit::Ns => "ns",
            Unit::Us => "us",
            Unit::Ms => "ms",
        }
    }

    #[must_use]
    pub fn seconds_per_unit(self) -> f64 {
        match self {
            Unit::Fs => 1e-15,
            Unit::Ps => 1e-12,
            Unit::Ns => 1e-9,
            Unit::Us => 1e-6,
            Unit::Ms => 1e-3,
        }
    }

    #[must_use]
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "fs" => Some(Unit::Fs),
            "ps" => Some(Unit::Ps),
            "ns" => Some(Unit::Ns),
            "us" => Some(Unit::Us),
            "ms" => Some(Unit::Ms),
            _ => None,
        }
    }
}

/// A negotiated `n <unit>` timescale, e.g. `1 us`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timescale {
    pub n: u64,
    pub unit: Unit,
}

impl Timescale {
    #[must_use]
    pub fn seconds(self) -> f64 {
        self.n as f64 * self.unit.seconds_per_unit()
    }

    /// §4.11 "choose a timescale ... auto-derived from `xtal` so one
    /// period is a whole number of units": starts at 1 ms and coarsens by
    /// factors of 1000 until one oscillator period divides evenly into a
    /// whole number of the chosen unit.
    #[must_use]
    pub fn auto(xtal_hz: f64) -> Self {
        if xtal_hz <= 0.0 {
            return Timescale { n: 1, unit: Unit::Ns };
        }
        let mut units_per_sec = 1e3;
        while units_per_sec / xtal_hz < 1.0 {
            units_per_sec *= 1000.0;
        }
        if (units_per_sec / xtal_hz).fract() > 0.0 {
            units_per_sec *= 1000.0;
        }
        let unit = if units_per_sec >= 1e15 {
            Unit::Fs
        } else if units_per_sec >= 1e12 {
            Unit::Ps
        } else if units_per_sec >= 1e9 {
            Unit::Ns
        } else if units_per_sec >= 1e6 {
            Unit::Us
        } else {
            Unit::Ms
        };
        Timescale { n: 1, unit }
    }

    fn scaled_time(self, seconds: f64) -> u64 {
        (seconds / self.seconds()).round() as u64
    }
}

#[derive(Debug, Clone, Copy)]
struct Watchpoint {
    cell: CellRef,
    bit_high: i32,
    bit_low: i32,
    mask: Word,
    id: char,
}

impl Watchpoint {
    fn width(self) -> u32 {
        (self.bit_high - self.bit_low + 1) as u32
    }
}

/// Output-mode state: accumulated header + body lines, plus the per-id
/// "committed" (last emitted) value used to decide whether a write is a
/// real change (§8 invariant 7, VCD idempotence).
#[derive(Default)]
struct OutputState {
    started: bool,
    paused: bool,
    module: String,
    timescale: Option<Timescale>,
    lines: Vec<String>,
    committed: std::collections::HashMap<char, Word>,
    /// Staged-but-not-yet-flushed values for the instant currently open;
    /// flushed (with one `#time` marker) as soon as time moves on or the
    /// recording stops. This is what collapses several writes landing at
    /// the same virtual instant into the single final value a real VCD
    /// viewer would observe.
    pending: std::collections::HashMap<char, Word>,
    pending_time: Option<f64>,
}

impl OutputState {
    fn stage(&mut self, time: f64, wp: &Watchpoint, masked: Word, out_lines: &mut Vec<(u64, char, Word, u32)>) {
        if self.pending_time != Some(time) {
            self.flush(out_lines);
            self.pending_time = Some(time);
        }
        let committed = self.committed.get(&wp.id).copied().unwrap_or(u32::MAX);
        if masked == committed {
            self.pending.remove(&wp.id);
        } else {
            self.pending.insert(wp.id, masked);
        }
    }

    fn flush(&mut self, out_lines: &mut Vec<(u64, char, Word, u32)>) {
        if self.pending.is_empty() {
            return;
        }
        let Some(time) = self.pending_time else { return };
        let ts = self.timescale.unwrap_or(Timescale { n: 1, unit: Unit::Ns });
        let scaled = ts.scaled_time(time);
        for (id, value) in self.pending.drain() {
            self.committed.insert(id, value);
            out_lines.push((scaled, id, value, 0));
        }
    }
}

/// Input-mode state: the parsed variable bindings and the time-ordered
/// queue of pending writes (§4.11 "Input protocol").
#[derive(Default)]
struct InputState {
    timescale: Timescale,
    /// `$var` id -> bound cell + bit range, populated by [`VcdRecorder::bind_input_var`].
    bindings: std::collections::HashMap<char, (CellRef, Word, i32)>,
    events: VecDeque<(f64, char, Word)>,
    /// §4.11 "optionally install a dynamic fetch breakpoint at the CPU's
    /// PC": the excluded CPU/debugger layer polls this rather than the
    /// recorder reaching into it directly.
    want_break: bool,
}

impl Default for Timescale {
    fn default() -> Self {
        Timescale { n: 1, unit: Unit::Ns }
    }
}

enum Mode {
    Idle,
    Output(OutputState),
    Input(InputState),
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Idle
    }
}

/// One `var` declaration parsed out of a recorded stream's header.
#[derive(Debug, Clone)]
pub struct ParsedVar {
    pub id: char,
    pub width: u32,
    pub name: String,
}

/// The result of [`parse`]: a negotiated timescale, the declared
/// variables (for the caller to resolve to cells and bind back with
/// [`VcdRecorder::bind_input_var`]), and the time-ordered value changes.
#[derive(Debug, Clone)]
pub struct ParsedVcd {
    pub timescale: Timescale,
    pub vars: Vec<ParsedVar>,
    /// `(time in seconds, var id, raw value)`.
    pub events: Vec<(f64, char, Word)>,
}

/// Parses a VCD text stream (§6 "VCD format", §4.11 "Input protocol").
/// `$dumpvars` initial values are consumed but not replayed as events —
/// matching the original's own documented gap (`// FIXME: not implemented
/// yet` in `vcd.cc`) since the very first `#0` delta carries the same
/// information for any well-formed recording.
pub fn parse(text: &str) -> Result<ParsedVcd, VcdError> {
    let mut timescale = Timescale::default();
    let mut vars = Vec::new();
    let mut events = Vec::new();
    let mut current_units: f64 = 0.0;

    let mut tokens = text.split_whitespace().peekable();
    while let Some(tok) = tokens.next() {
        match tok {
            "$timescale" => {
                let n_tok = tokens.next().ok_or_else(|| VcdError::new("truncated $timescale"))?;
                let (n, unit) = if let Some(unit_tok) = tokens.next() {
                    if unit_tok == "$end" {
                        parse_combined_timescale(n_tok)?
                    } else {
                        expect_end(&mut tokens)?;
                        let n: u64 = n_tok.parse().map_err(|_| VcdError::new("bad $timescale number"))?;
                        let unit = Unit::from_label(unit_tok).ok_or_else(|| VcdError::new("bad $timescale unit"))?;
                        (n, unit)
                    }
                } else {
                    return Err(VcdError::new("truncated $timescale"));
                };
                timescale = Timescale { n, unit };
            }
            "$var" => {
                let kind = tokens.next().ok_or_else(|| VcdError::new("truncated $var"))?;
                if kind != "wire" && kind != "reg" {
                    consume_until_end(&mut tokens);
                    continue;
                }
                let width: u32 = tokens
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or_else(|| VcdError::new("bad $var width"))?;
                let id = tokens
                    .next()
                    .and_then(|s| s.chars().next())
                    .ok_or_else(|| VcdError::new("missing $var id"))?;
                let name = tokens.next().ok_or_else(|| VcdError::new("missing $var name"))?.to_string();
                consume_until_end(&mut tokens);
                vars.push(ParsedVar { id, width, name });
            }
            "$date" | "$version" | "$scope" | "$upscope" | "$enddefinitions" | "$dumpvars" => {
                consume_until_end(&mut tokens);
            }
            _ if tok.starts_with('#') => {
                current_units = tok[1..].parse().map_err(|_| VcdError::new("bad time marker"))?;
            }
            _ if tok.starts_with('b') || tok.starts_with('B') => {
                let bits = &tok[1..];
                let value = u32::from_str_radix(bits, 2).map_err(|_| VcdError::new("bad binary value"))?;
                let id_tok = tokens.next().ok_or_else(|| VcdError::new("missing id after vector value"))?;
                let id = id_tok.chars().next().ok_or_else(|| VcdError::new("empty id"))?;
                events.push((current_units * timescale.seconds(), id, value));
            }
            _ if matches!(tok.as_bytes().first(), Some(b'0' | b'1')) && tok.len() >= 2 => {
                let value = Word::from(tok.as_bytes()[0] - b'0');
                let id = tok[1..].chars().next().ok_or_else(|| VcdError::new("empty id"))?;
                events.push((current_units * timescale.seconds(), id, value));
            }
            _ => {}
        }
    }
    Ok(ParsedVcd { timescale, vars, events })
}

fn parse_combined_timescale(tok: &str) -> Result<(u64, Unit), VcdError> {
    let split_at = tok.find(|c: char| !c.is_ascii_digit()).ok_or_else(|| VcdError::new("bad $timescale token"))?;
    let (n_str, unit_str) = tok.split_at(split_at);
    let n: u64 = n_str.parse().map_err(|_| VcdError::new("bad $timescale number"))?;
    let unit = Unit::from_label(unit_str).ok_or_else(|| VcdError::new("bad $timescale unit"))?;
    Ok((n, unit))
}

fn consume_until_end<'a>(tokens: &mut impl Iterator<Item = &'a str>) {
    for t in tokens.by_ref() {
        if t == "$end" {
            break;
        }
    }
}

fn expect_end<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<(), VcdError> {
    match tokens.next() {
        Some("$end") => Ok(()),
        _ => Err(VcdError::new("expected $end")),
    }
}

pub struct VcdRecorder {
    instance: u32,
    id: PeripheralId,
    watchpoints: Vec<Watchpoint>,
    hooked: std::collections::HashSet<CellRef>,
    next_id: u32,
    mode: Mode,
    dobreak: bool,
}

impl VcdRecorder {
    #[must_use]
    pub fn new(instance: u32) -> Self {
        Self {
            instance,
            id: PeripheralId(usize::MAX),
            watchpoints: Vec::new(),
            hooked: std::collections::HashSet::new(),
            next_id: 0,
            mode: Mode::Idle,
            dobreak: false,
        }
    }

    pub fn install(&mut self, id: PeripheralId) {
        self.id = id;
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(&self.mode, Mode::Output(o) if o.started) || matches!(&self.mode, Mode::Input(_))
    }

    #[must_use]
    pub fn dobreak(&self) -> bool {
        self.dobreak
    }

    pub fn toggle_break(&mut self) {
        self.dobreak = !self.dobreak;
    }

    /// §4.11 "Output protocol": registers a `(cell, bit-range)` watchpoint
    /// and hooks a hw-callback operator onto its cell (no-op if already
    /// hooked, so several watchpoints on one cell share a single operator,
    /// matching the original's `register_cell` only-once-per-cell rule).
    pub fn add_watchpoint(&mut self, mcu: &mut Mcu, cell: CellRef, bit_range: Option<(u8, u8)>) -> char {
        let width = mcu.chip(cell.chip).width();
        let (high, low) = bit_range.map_or((width as i32 - 1, 0), |(h, l)| (i32::from(h), i32::from(l)));
        let mask: Word = if high == low {
            1 << low
        } else {
            (((1u64 << (high - low + 1)) - 1) as Word) << low
        };
        let id = char::from_u32(33 + self.next_id).unwrap_or('~');
        self.next_id += 1;
        self.watchpoints.push(Watchpoint { cell, bit_high: high, bit_low: low, mask, id });
        if self.hooked.insert(cell) {
            mcu.hook_cell(self.id, cell);
        }
        id
    }

    /// §4.11 "Output protocol": begins an output recording. `names` must
    /// have one label per call to [`Self::add_watchpoint`] so far, in the
    /// order they were added (the original resolves this via
    /// `uc->cell_name`; since name resolution belongs to the excluded
    /// variable/debugger layer, callers pass the labels explicitly).
    pub fn start_output(&mut self, mcu: &mut Mcu, module: impl Into<String>, names: &[&str], timescale: Option<Timescale>) {
        let ts = timescale.unwrap_or_else(|| Timescale::auto(mcu.scheduler.xtal_hz()));
        let mut lines = Vec::new();
        lines.push("$date".to_string());
        lines.push("$version\n\tucsim\n$end".to_string());
        lines.push(format!("$timescale {} {} $end", ts.n, ts.unit.label()));
        let module = module.into();
        lines.push(format!("$scope module {module} $end"));
        for (i, wp) in self.watchpoints.iter().enumerate() {
            let name = names.get(i).copied().unwrap_or("?");
            lines.push(format!("$var wire {} {} {name} $end", wp.width(), wp.id));
        }
        lines.push("$upscope $end".to_string());
        lines.push("$enddefinitions $end".to_string());
        lines.push("$dumpvars".to_string());
        let mut committed = std::collections::HashMap::new();
        for wp in &self.watchpoints {
            let raw = mcu.cell_read_raw(wp.cell);
            let masked = (raw & wp.mask) >> wp.bit_low.max(0);
            committed.insert(wp.id, masked);
            lines.push(value_change_line(wp.bit_high, wp.bit_low, wp.id, masked));
        }
        lines.push("$end".to_string());
        self.mode = Mode::Output(OutputState {
            started: true,
            paused: false,
            module,
            timescale: Some(ts),
            lines,
            committed,
            pending: std::collections::HashMap::new(),
            pending_time: None,
        });
    }

    pub fn pause(&mut self) {
        if let Mode::Output(o) = &mut self.mode {
            o.paused = !o.paused;
        }
    }

    /// Stops the current recording, flushing any staged-but-unflushed
    /// output-mode values first.
    pub fn stop(&mut self) {
        if let Mode::Output(o) = &mut self.mode {
            let mut flushed = Vec::new();
            o.flush(&mut flushed);
            for (scaled, id, value, _) in flushed {
                o.lines.push(format!("#{scaled}"));
                let wp = self.watchpoints.iter().find(|w| w.id == id);
                let (high, low) = wp.map_or((7, 0), |w| (w.bit_high, w.bit_low));
                o.lines.push(value_change_line(high, low, id, value));
            }
            o.started = false;
        }
        self.mode = Mode::Idle;
    }

    #[must_use]
    pub fn output_text(&self) -> String {
        match &self.mode {
            Mode::Output(o) => o.lines.join("\n") + "\n",
            _ => String::new(),
        }
    }

    /// §4.11 "Input protocol": begin driving writes from a previously
    /// [`parse`]d stream. `bindings` maps each parsed `$var` id to the
    /// cell (and `[high,low]` bit-range) it should drive — resolved by the
    /// caller (the excluded variable/symbol layer) from [`ParsedVar::name`].
    pub fn start_input(&mut self, parsed: &ParsedVcd, bindings: &[(char, CellRef, i32, i32)]) -> Result<(), VcdError> {
        let mut map = std::collections::HashMap::new();
        for &(id, cell, high, low) in bindings {
            let mask: Word = if high == low {
                1 << low
            } else {
                (((1u64 << (high - low + 1)) - 1) as Word) << low
            };
            map.insert(id, (cell, mask, low));
        }
        for &(_, id, _) in &parsed.events {
            if !map.contains_key(&id) {
                return Err(VcdError::new(format!("event references unbound id '{id}'")));
            }
        }
        let mut events: VecDeque<(f64, char, Word)> = parsed.events.iter().copied().collect();
        events.make_contiguous().sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        self.mode = Mode::Input(InputState {
            timescale: parsed.timescale,
            bindings: map,
            events,
            want_break: false,
        });
        Ok(())
    }

    /// Whether the input driver wants a dynamic fetch breakpoint installed
    /// at the CPU's current PC before the next instruction executes, so a
    /// just-applied write is visible in time (§4.11). Consumed by the
    /// excluded CPU loop, which clears it by calling this once per
    /// instruction boundary.
    pub fn take_want_break(&mut self) -> bool {
        if let Mode::Input(i) = &mut self.mode {
            std::mem::replace(&mut i.want_break, false)
        } else {
            false
        }
    }

    /// Applies every input-mode event whose time has arrived.
    fn drain_due(&mut self, mcu: &mut Mcu, now: f64) {
        let Mode::Input(input) = &mut self.mode else { return };
        while let Some(&(t, id, value)) = input.events.front() {
            if t > now {
                break;
            }
            if let Some(&(cell, mask, low)) = input.bindings.get(&id) {
                let current = mcu.cell_read_raw(cell);
                let new_val = (current & !mask) | ((value << low.max(0)) & mask);
                mcu.cell_write(cell, new_val, WriteOrigin::Hardware);
            }
            input.events.pop_front();
            if self.dobreak {
                input.want_break = true;
            }
        }
    }
}

fn value_change_line(bit_high: i32, bit_low: i32, id: char, value: Word) -> String {
    if bit_high == bit_low {
        format!("{}{id}", if value & 1 != 0 { '1' } else { '0' })
    } else {
        format!("b{value:b} {id}")
    }
}

impl Hw for VcdRecorder {
    fn category(&self) -> HwCategory {
        HwCategory::Vcd
    }

    fn instance(&self) -> u32 {
        self.instance
    }

    fn reset(&mut self, _mcu: &mut Mcu) {
        // §4.11/§5: a simulator `reset` does not implicitly stop a
        // recording in progress -- matches the original, which only tears
        // down VCD state on an explicit `stop` command.
    }

    fn read(&mut self, mcu: &mut Mcu, cell: CellRef) -> Word {
        // Transparent: the recorder never owns the cells it watches, so a
        // read must see the value underlying any other hw-callback (§9
        // "Dynamic dispatch via category filtering").
        mcu.cell_read_raw(cell)
    }

    fn write(&mut self, mcu: &mut Mcu, cell: CellRef, value: Word, _origin: WriteOrigin) -> Word {
        let watchpoints = self.watchpoints.clone();
        let now = mcu.scheduler.rtime();
        if let Mode::Output(out) = &mut self.mode {
            if out.started && !out.paused {
                let mut flushed = Vec::new();
                for wp in watchpoints.iter().filter(|w| w.cell == cell) {
                    let masked = (value & wp.mask) >> wp.bit_low.max(0);
                    out.stage(now, wp, masked, &mut flushed);
                }
                for (scaled, id, v, _) in flushed {
                    out.lines.push(format!("#{scaled}"));
                    let wp = watchpoints.iter().find(|w| w.id == id);
                    let (high, low) = wp.map_or((7, 0), |w| (w.bit_high, w.bit_low));
                    out.lines.push(value_change_line(high, low, id, v));
                }
            }
        }
        value
    }

    fn tick(&mut self, mcu: &mut Mcu, _cycles: u64) {
        if matches!(self.mode, Mode::Input(_)) {
            let now = mcu.scheduler.rtime();
            self.drain_due(mcu, now);
        }
    }

    fn happen(&mut self, _mcu: &mut Mcu, _source: PeripheralId, _event: Event) {}

    fn config_registers(&self) -> &'static [ConfigReg] {
        &[]
    }

    fn take_text_output(&mut self) -> Option<String> {
        Some(self.output_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ucsim_core::chip::{Chip, Fill};

    fn setup() -> (Mcu, ucsim_core::ChipId) {
        // xtal = 1 MHz, 1 clock per cycle: one credited cycle == one
        // microsecond of rtime, so test timestamps read directly as µs.
        let mut mcu = Mcu::new(1_000_000.0, 1);
        let chip = mcu.add_chip(Chip::new("ram", 16, 8, Fill::Constant(0)));
        (mcu, chip)
    }

    fn at(mcu: &mut Mcu, us: u64) {
        mcu.scheduler.reset_time();
        mcu.scheduler.credit(us);
    }

    /// §8 scenario 6: a single 8-bit watchpoint, timescale 1us, sequence
    /// `(t=0,0x00) (t=5,0x01) (t=5,0x02) (t=8,0x02) (t=9,0x00)` emits
    /// exactly markers `#0,#5,#9` and change lines `b0,b10,b0`; the
    /// second write at t=5 adds no extra marker, and the unchanged write
    /// at t=8 emits nothing. Drives the recorder's `Hw::write` hook
    /// directly (its natural call site once hooked through `Mcu`) so the
    /// test only needs the recorder's own handle to inspect the result.
    #[test]
    fn vcd_round_trip_scenario() {
        let (mut mcu, chip) = setup();
        // Seed a distinct initial value so the t=0 write is a real change.
        mcu.chip_mut(chip).download(0, 0xFF);
        let cell = CellRef::new(chip, 0);

        let mut vcd = VcdRecorder::new(0);
        vcd.install(PeripheralId(0));
        vcd.add_watchpoint(&mut mcu, cell, None);
        vcd.start_output(&mut mcu, "top", &["sig"], Some(Timescale { n: 1, unit: Unit::Us }));

        for (us, value) in [(0, 0x00), (5, 0x01), (5, 0x02), (8, 0x02), (9, 0x00)] {
            at(&mut mcu, us);
            vcd.write(&mut mcu, cell, value, WriteOrigin::Software);
        }
        vcd.stop();

        let out = vcd.output_text();
        let body: Vec<&str> = out.lines().skip_while(|l| *l != "$end").skip(1).collect();
        let markers: Vec<&str> = body.iter().filter(|l| l.starts_with('#')).copied().collect();
        let changes: Vec<&str> = body.iter().filter(|l| !l.starts_with('#')).copied().collect();
        assert_eq!(markers, vec!["#0", "#5", "#9"]);
        assert_eq!(changes, vec!["b0 !", "b10 !", "b0 !"]);
    }

    #[test]
    fn auto_timescale_picks_whole_unit_period() {
        let ts = Timescale::auto(16_000_000.0);
        assert!((ts.seconds() * 16_000_000.0).fract().abs() < 1e-6);
    }

    #[test]
    fn value_change_line_formats_scalar_and_vector() {
        assert_eq!(value_change_line(0, 0, '!', 1), "1!");
        assert_eq!(value_change_line(7, 0, '!', 2), "b10 !");
        assert_eq!(value_change_line(7, 0, '!', 0), "b0 !");
    }

    #[test]
    fn parse_recovers_timescale_vars_and_events() {
        let text = "$timescale 1 us $end\n$var wire 8 ! sig $end\n$enddefinitions $end\n$dumpvars\nb00000000 !\n$end\n#5\nb00000010 !\n";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.timescale.n, 1);
        assert_eq!(parsed.timescale.unit, Unit::Us);
        assert_eq!(parsed.vars.len(), 1);
        assert_eq!(parsed.vars[0].name, "sig");
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].1, '!');
        assert_eq!(parsed.events[0].2, 2);
    }

    #[test]
    fn parse_rejects_malformed_timescale() {
        let err = parse("$timescale bogus $end\n").unwrap_err();
        assert!(err.to_string().contains("vcd"));
    }
}
