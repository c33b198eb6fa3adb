#![no_std]
#![no_main]

use core::cell::RefCell;

use defmt::{info, unwrap, warn};
use display_interface_spi::SPIInterface;
use embassy_embedded_hal::shared_bus::blocking::spi::SpiDevice;
use embassy_executor::Spawner;
use embassy_rp::{
    gpio::{Input, Level, Output, Pull},
    peripherals::SPI0,
    spi::{Blocking, Config as ConfigSpi, Spi},
};
use embassy_sync::blocking_mutex::NoopMutex;
use embassy_time::{Delay, Duration, Instant, Timer};
use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::Rgb565,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::Text,
};
use mipidsi::{
    models::ST7735s,
    options::{ColorOrder, Orientation},
};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use parking_sensor::{
    format_reading, AlertPanel, AlertTier, CaptureTimer, CaptureUnit, Config, EchoState, EchoTimer,
    Edge, Error, Now, TimeBase,
};

/// Longest echo worth waiting for, a bit above the 4 m range of the sensor.
const ECHO_TIMEOUT_US: u32 = 30_000;
/// Pause between measurements so the previous burst has died down.
const MEASUREMENT_INTERVAL_MS: u64 = 60;

static ECHO: EchoState = EchoState::new();
static SPI_BUS: StaticCell<NoopMutex<RefCell<Spi<'static, SPI0, Blocking>>>> = StaticCell::new();

struct EmbassyClock;

impl Now for EmbassyClock {
    fn now_micros(&self) -> u64 {
        Instant::now().as_micros()
    }
}

/// Capture timer made of a GPIO edge wait and the embassy time driver.
///
/// The RP2350 has no input-capture channel, so the counter is derived from
/// `Instant` and the latch happens when the edge wait completes.
struct EdgeCapture {
    echo: Input<'static>,
    ticks_per_second: u64,
    epoch: Instant,
    edge_at: Option<Instant>,
    captured: u16,
    edge: Edge,
    running: bool,
}

impl EdgeCapture {
    fn new(echo: Input<'static>) -> Self {
        Self {
            echo,
            ticks_per_second: u64::from(TimeBase::Div8.ticks_per_second()),
            epoch: Instant::now(),
            edge_at: None,
            captured: 0,
            edge: Edge::Rising,
            running: false,
        }
    }

    // 16-bit counter, wraps like the hardware one
    fn ticks_at(&self, at: Instant) -> u16 {
        let micros = at.saturating_duration_since(self.epoch).as_micros();
        (micros * self.ticks_per_second / 1_000_000) as u16
    }

    /// Wait for the selected edge and latch the counter.
    async fn wait_for_capture(&mut self) {
        while !self.running {
            Timer::after_millis(10).await;
        }
        match self.edge {
            Edge::Rising => self.echo.wait_for_rising_edge().await,
            Edge::Falling => self.echo.wait_for_falling_edge().await,
        }
        let at = Instant::now();
        self.captured = self.ticks_at(at);
        self.edge_at = Some(at);
    }

    fn edge_handled(&mut self) {
        self.edge_at = None;
    }
}

impl CaptureTimer for EdgeCapture {
    fn start(&mut self, time_base: TimeBase, edge: Edge) {
        self.ticks_per_second = u64::from(time_base.ticks_per_second());
        self.edge = edge;
        self.epoch = Instant::now();
        self.edge_at = None;
        self.captured = 0;
        self.running = true;
    }

    fn select_edge(&mut self, edge: Edge) {
        self.edge = edge;
    }

    fn captured(&self) -> u16 {
        self.captured
    }

    fn counter(&self) -> u16 {
        self.ticks_at(Instant::now())
    }

    fn clear_counter(&mut self) {
        // inside a notification the counter restarts at the edge itself
        self.epoch = self.edge_at.unwrap_or_else(Instant::now);
    }

    fn stop(&mut self) {
        self.running = false;
        self.epoch = Instant::now();
        self.edge_at = None;
        self.captured = 0;
    }
}

/// Stands in for the capture interrupt.
#[embassy_executor::task]
async fn capture_task(mut capture: CaptureUnit<'static, EdgeCapture>) -> ! {
    loop {
        capture.timer_mut().wait_for_capture().await;
        capture.on_capture();
        capture.timer_mut().edge_handled();
    }
}

fn draw_reading<D>(display: &mut D, reading: Option<u16>) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let text_style = MonoTextStyle::new(&FONT_6X10, Rgb565::WHITE);

    Rectangle::new(Point { x: 0, y: 10 }, Size::new(128, 40))
        .into_styled(PrimitiveStyle::with_fill(Rgb565::BLACK))
        .draw(display)?;

    match reading {
        Some(cm) => {
            Text::new(&format_reading(cm), Point { x: 10, y: 20 }, text_style).draw(display)?;
            let banner = AlertTier::from_distance(cm).banner();
            Text::new(banner, Point { x: 46, y: 40 }, text_style).draw(display)?;
        }
        None => {
            Text::new("Distance=---cm", Point { x: 10, y: 20 }, text_style).draw(display)?;
        }
    }
    Ok(())
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    info!("Parking sensor starting");

    let trigger = Output::new(p.PIN_12, Level::Low);
    let echo = Input::new(p.PIN_13, Pull::Down);

    let mut panel = AlertPanel::new(
        Output::new(p.PIN_2, Level::Low),
        Output::new(p.PIN_3, Level::Low),
        Output::new(p.PIN_4, Level::Low),
        Output::new(p.PIN_5, Level::Low),
    );

    // --- SPI and display setup ---
    let mut spiconfig = ConfigSpi::default();
    spiconfig.frequency = 32_000_000;

    let spi = Spi::new_blocking(p.SPI0, p.PIN_18, p.PIN_19, p.PIN_16, spiconfig);
    let spi_bus = SPI_BUS.init(NoopMutex::new(RefCell::new(spi)));

    let cs = Output::new(p.PIN_17, Level::High);
    let dc = Output::new(p.PIN_20, Level::Low);
    let reset = Output::new(p.PIN_21, Level::High);
    let _backlight = Output::new(p.PIN_15, Level::High);

    let di = SPIInterface::new(SpiDevice::new(spi_bus, cs), dc);
    let mut display = mipidsi::Builder::new(ST7735s, di)
        .color_order(ColorOrder::Bgr)
        .reset_pin(reset)
        .orientation(Orientation::new())
        .init(&mut Delay)
        .unwrap();
    display.clear(Rgb565::BLACK).unwrap();

    // --- Echo timing ---
    let config = Config {
        echo_timeout_us: Some(ECHO_TIMEOUT_US),
        temperature_celsius: None,
    };
    let mut capture = CaptureUnit::new(EdgeCapture::new(echo));
    let mut sensor = EchoTimer::new(trigger, &ECHO, config, EmbassyClock, Delay);
    unwrap!(sensor.init(&mut capture));
    unwrap!(spawner.spawn(capture_task(capture)));

    loop {
        let reading = match sensor.measure().await {
            Ok(distance) => {
                info!("Distance: {} cm", distance);
                Some(distance)
            }
            Err(Error::Timeout) => {
                warn!("No echo within {} us", ECHO_TIMEOUT_US);
                None
            }
            Err(e) => {
                warn!("Measurement error: {:?}", e);
                None
            }
        };

        if draw_reading(&mut display, reading).is_err() {
            warn!("Display write failed");
        }

        let tier = reading.map_or(AlertTier::Clear, AlertTier::from_distance);
        if let Err(e) = panel.present_async(tier, &mut Delay).await {
            warn!("Indicator error: {:?}", e);
        }

        Timer::after(Duration::from_millis(MEASUREMENT_INTERVAL_MS)).await;
    }
}
