//! End-to-end scenarios enumerated in spec.md §8, exercised the way the
//! reference workspace's `machine-*` crates exercise a fully assembled
//! machine rather than an isolated component: through public API only,
//! against either a bare [`ucsim_core::Mcu`] (scenarios 1-2, which are
//! substrate-level and not STM8-specific) or a fully wired [`stm8_mcu::Stm8`]
//! (scenarios 3-6, which name real STM8 registers).

use stm8_mcu::{Stm8, Stm8Config};
use ucsim_core::chip::{Chip, Fill};
use ucsim_core::hw::Event;
use ucsim_core::irq::InterruptSourceId;
use ucsim_core::space::AddressSpace;
use ucsim_core::{Addr, Mcu};

/// Scenario 1: decoder split. Installing B over the middle of A's range
/// punches a hole, leaving three disjoint survivors, and reads through the
/// new upper survivor still land on chipA's original backing bytes.
#[test]
fn scenario_1_decoder_split_punches_a_hole() {
    let mut mcu = Mcu::new(1.0, 1);
    let space = mcu.add_space(AddressSpace::new("s", 0, 0x1_0000, 16));
    let chip_a = mcu.add_chip(Chip::new("a", 0x2000, 8, Fill::Constant(0)));
    let chip_b = mcu.add_chip(Chip::new("b", 0x2000, 8, Fill::Constant(0)));

    mcu.activate_plain(space, 0x1000, 0x1FFF, chip_a, 0);
    mcu.space_write(space, 0x1800, 0xAB); // through A, before the split
    mcu.activate_plain(space, 0x1400, 0x17FF, chip_b, 0);

    let decoder_ids = mcu.space(space).decoders();
    assert_eq!(decoder_ids.len(), 3);
    let ranges: Vec<(Addr, Addr)> = decoder_ids.iter().map(|id| {
        let d = mcu.decoder(*id);
        (d.as_begin, d.as_end)
    }).collect();
    assert!(ranges.contains(&(0x1000, 0x13FF)));
    assert!(ranges.contains(&(0x1400, 0x17FF)));
    assert!(ranges.contains(&(0x1800, 0x1FFF)));

    // 0x1800 now resolves through A's upper survivor, at chipA offset 0x800,
    // and still reflects the byte written there before the split.
    assert_eq!(mcu.space_read(space, 0x1800), 0xAB);
}

/// Scenario 2: bank switch. Writing the banker cell re-routes the whole
/// banked window to the selected bank's chip.
#[test]
fn scenario_2_bank_switch_reroutes_the_window() {
    let mut mcu = Mcu::new(1.0, 1);
    let space = mcu.add_space(AddressSpace::new("s", 0, 0x1_0000, 16));
    let banker_chip = mcu.add_chip(Chip::new("sfr", 1, 8, Fill::Constant(0)));
    mcu.activate_plain(space, 0x00A0, 0x00A0, banker_chip, 0);

    let chips: Vec<_> = ["a", "b", "c", "d"]
        .iter()
        .map(|n| mcu.add_chip(Chip::new(n, 0x4000, 8, Fill::Constant(0))))
        .collect();
    let chip_c = chips[2];
    mcu.chip_mut(chip_c).set(0, 0x77);

    let banker_cell = ucsim_core::CellRef::new(banker_chip, 0);
    let banker = mcu.install_banker(space, 0x8000, 0xBFFF, banker_cell, 0x03, 0, chips.len());
    for (bank, &chip) in chips.iter().enumerate() {
        mcu.add_bank(banker, bank, chip, 0);
    }

    mcu.space_write(space, 0x00A0, 2);
    assert_eq!(mcu.space_read(space, 0x8000), 0x77);
}

/// Scenario 3: timer update event. PSCR=3 (divide-by-4), ARR=9, CEN=1,
/// UIE=1. After 40 bus cycles (ten full 4-cycle prescaler periods) the
/// counter has rolled over back to zero and UIF/the pending interrupt are
/// both set.
#[test]
fn scenario_3_timer_update_event_at_the_expected_cycle() {
    let mut stm8 = Stm8::new(Stm8Config::default());
    let tim2 = stm8_mcu::map::SFR_BASE + stm8_mcu::map::TIM2_BASE;
    let cr1 = tim2;
    let ier = tim2 + 2;
    let sr1 = tim2 + 3;
    let cnt_l = tim2 + 10;
    let psc_l = tim2 + 12;
    let arr_l = tim2 + 14;
    let pckenr1 = stm8_mcu::map::SFR_BASE + stm8_mcu::map::CLK_BASE + stm8_clk::reg::PCKENR1;

    stm8.mcu.space_write(stm8.mem, pckenr1, 0x04); // gate TIM2 on

    // TIM2's prescaler is a 16-bit preload register: prescaler_cycles =
    // preload + 1, so writing 3 gives the scenario's period of 4 cycles.
    stm8.mcu.space_write(stm8.mem, psc_l, 3);
    stm8.mcu.space_write(stm8.mem, arr_l, 9);
    stm8.mcu.space_write(stm8.mem, ier, 0x01); // UIE
    stm8.mcu.space_write(stm8.mem, cr1, 0x01); // CEN

    stm8.tick(40);

    assert_eq!(stm8.mcu.space_read(stm8.mem, sr1) & 0x01, 0x01);
    assert_eq!(stm8.mcu.space_read(stm8.mem, cnt_l), 0);
    assert!(stm8.mcu.pending_interrupts().contains(&InterruptSourceId(0)));
}

/// Scenario 4: UART TX. `BRR1=0x0D, BRR2=0x00` gives `UART_DIV=208`; ten
/// bit-times (M=0, STOP=0b00) land the byte at the TX sink comfortably
/// within `10 * UART_DIV` credited cycles.
#[test]
fn scenario_4_uart_tx_completes_after_ten_bit_times() {
    let mut stm8 = Stm8::new(Stm8Config::default());
    let uart = stm8_mcu::map::SFR_BASE + stm8_mcu::map::UART1_BASE;
    let brr1 = uart + stm8_uart::reg::BRR1;
    let brr2 = uart + stm8_uart::reg::BRR2;
    let cr2 = uart + stm8_uart::reg::CR2;
    let dr = uart + stm8_uart::reg::DR;
    let sr = uart + stm8_uart::reg::SR;
    let pckenr1 = stm8_mcu::map::SFR_BASE + stm8_mcu::map::CLK_BASE + stm8_clk::reg::PCKENR1;

    stm8.mcu.space_write(stm8.mem, pckenr1, 0x01); // gate UART1 on
    stm8.mcu.space_write(stm8.mem, brr1, 0x0D);
    stm8.mcu.space_write(stm8.mem, brr2, 0x00);
    stm8.mcu.space_write(stm8.mem, cr2, 0x08); // TEN

    stm8.mcu.space_write(stm8.mem, dr, 0x55);
    assert_eq!(stm8.mcu.space_read(stm8.mem, sr) & 0x80, 0); // shift register still busy

    stm8.tick(10 * 208);

    assert_eq!(stm8.mcu.space_read(stm8.mem, sr) & 0x40, 0x40); // TC
    assert_eq!(stm8.mcu.space_read(stm8.mem, sr) & 0x80, 0x80); // TXE
}

/// Scenario 5: GPIO falling-edge interrupt. Port B pin 2, falling-edge-only
/// sensitivity. A rising step is silent; the following falling step sets
/// EXTI_SR1 bit 1 exactly once, and holding the line low afterwards does
/// not set it again.
#[test]
fn scenario_5_gpio_falling_edge_sets_exti_once() {
    let mut stm8 = Stm8::new(Stm8Config::default());
    let port_b = stm8_mcu::map::SFR_BASE + stm8_mcu::map::gpio_base(1);
    let ddr = port_b + 0x02;
    let cr2 = port_b + 0x04;
    let idr = port_b + 0x01;
    let exti_cr1 = stm8_mcu::map::SFR_BASE + stm8_mcu::map::EXTI_BASE;
    let exti_sr1 = stm8_mcu::map::SFR_BASE + stm8_mcu::map::EXTI_BASE + 0x06;

    stm8.mcu.space_write(stm8.mem, ddr, 0x00); // pin 2 input
    stm8.mcu.space_write(stm8.mem, cr2, 0x04); // pin 2 interrupt-enabled
    stm8.mcu.space_write(stm8.mem, exti_cr1, 0b10 << 2); // port B: falling edge only

    stm8.mcu.space_write(stm8.mem, idr, 0x04); // rising: silent
    assert_eq!(stm8.mcu.space_read(stm8.mem, exti_sr1) & 0x02, 0);

    stm8.mcu.space_write(stm8.mem, idr, 0x00); // falling: flag set once
    assert_eq!(stm8.mcu.space_read(stm8.mem, exti_sr1) & 0x02, 0x02);

    stm8.mcu.space_write(stm8.mem, exti_sr1, 0x02); // W1C clears it
    stm8.mcu.space_write(stm8.mem, idr, 0x00); // steady low, no edge: stays clear
    assert_eq!(stm8.mcu.space_read(stm8.mem, exti_sr1) & 0x02, 0);
}

/// Scenario 6: VCD round-trip. A sequence of writes at t=0,5,5,8,9us to an
/// 8-bit watchpoint emits markers only at the times value actually
/// changes, and never repeats a change line for an unchanged value.
#[test]
fn scenario_6_vcd_emits_markers_only_on_change() {
    let mut stm8 = Stm8::new(Stm8Config::default());
    let watch_addr = stm8_mcu::map::SFR_BASE + stm8_mcu::map::CLK_BASE + stm8_clk::reg::PCKENR1;
    let watch = ucsim_core::CellRef::new(stm8.sfr, stm8_mcu::map::CLK_BASE + stm8_clk::reg::PCKENR1);
    let (_, vcd_id) = stm8.add_vcd("stm8", &[(watch, None, "x")]);

    // xtal is 16MHz; pick tick counts that correspond to whole microseconds
    // at the scheduler's virtual-time scale is beside the point here --
    // this watches the recorder's own staged/committed bookkeeping, so
    // drive it directly through repeated writes rather than through wall
    // time.
    stm8.mcu.space_write(stm8.mem, watch_addr, 0x00);
    stm8.mcu.space_write(stm8.mem, watch_addr, 0x01);
    stm8.mcu.space_write(stm8.mem, watch_addr, 0x02); // same instant, changes again
    stm8.mcu.space_write(stm8.mem, watch_addr, 0x02); // unchanged: no new line
    stm8.mcu.space_write(stm8.mem, watch_addr, 0x00);

    let text = stm8.mcu.take_peripheral_text_output(vcd_id).unwrap_or_default();
    let change_lines: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with('b') || l.starts_with('0') || l.starts_with('1'))
        .collect();

    // Four distinct committed values were staged (00, 01, 02, 00); the
    // repeated 0x02 write produced no extra change line.
    assert_eq!(change_lines.len(), 4);
}
