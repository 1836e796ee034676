//! SFR offsets and interrupt vector numbers for the one fixed instance of
//! each peripheral [`crate::Stm8`] wires up. Real reference-manual values
//! where they matter (the `0x5000` SFR page STM8 maps into its unified
//! address space); block spacing between peripherals is generous rather
//! than bit-exact, since nothing outside this crate reads across a gap.

use ucsim_core::Addr;

/// STM8's SFRs live at `0x5000..0x57FF` in the unified memory map.
pub const SFR_BASE: Addr = 0x5000;

pub const EXTI_BASE: Addr = 0x00;
const GPIO_BASE: Addr = 0x10;
const GPIO_STRIDE: Addr = 0x10;
pub const CLK_BASE: Addr = 0x60;
pub const TIM2_BASE: Addr = 0x70;
pub const TIM4_BASE: Addr = 0x90;
pub const UART1_BASE: Addr = 0xA0;

/// One past the last byte any peripheral above touches.
pub const SFR_SIZE: usize = 0xB0;

/// Port `0` is `GPIOA`, `1` is `GPIOB`, and so on, matching the reference
/// manual's lettering.
#[must_use]
pub fn gpio_base(port: u8) -> Addr {
    GPIO_BASE + GPIO_STRIDE * Addr::from(port)
}

/// STM8 ITC interrupt numbers (reference manual Table "Interrupt
/// mapping"), used here as the [`ucsim_core::irq::InterruptSource`]
/// vector rather than a resolved flash address, since redirecting the
/// program counter is the excluded CPU core's job.
pub const IRQ_TIM2: u32 = 13;
pub const IRQ_TIM4: u32 = 23;
pub const IRQ_UART1_TX: u32 = 17;
pub const IRQ_UART1_RX: u32 = 18;
