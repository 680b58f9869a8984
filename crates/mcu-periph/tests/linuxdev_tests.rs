#![cfg(target_os = "linux")]

use std::fs;

use mcu_periph::backend::linuxdev::LinuxDev;
use mcu_periph::{
    BusState, Error, GpioChip, GpioParams, I2cBus, I2cParams, PinMode, PinValue, Registry,
    SpiBus, SpiParams,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fake /dev and sysfs
// ---------------------------------------------------------------------------

struct FakeSystem {
    root: TempDir,
}

impl FakeSystem {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("dev")).unwrap();
        fs::create_dir(root.path().join("gpio")).unwrap();
        Self { root }
    }

    fn backend(&self) -> LinuxDev {
        LinuxDev {
            dev_dir: self.root.path().join("dev"),
            gpio_dir: self.root.path().join("gpio"),
        }
    }

    /// A regular file standing in for a device node.
    fn add_node(&self, name: &str) {
        fs::write(self.root.path().join("dev").join(name), b"").unwrap();
    }

    /// The sysfs control files plus the attribute files of `pins`, as the
    /// kernel would create them on export.
    fn add_gpio(&self, pins: &[u32]) {
        let gpio = self.root.path().join("gpio");
        fs::write(gpio.join("export"), b"").unwrap();
        fs::write(gpio.join("unexport"), b"").unwrap();
        for pin in pins {
            let dir = gpio.join(format!("gpio{pin}"));
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("direction"), b"in").unwrap();
            fs::write(dir.join("value"), b"0").unwrap();
        }
    }

    fn gpio_file(&self, rel: &str) -> String {
        fs::read_to_string(self.root.path().join("gpio").join(rel)).unwrap()
    }
}

fn i2c_registry(sys: &FakeSystem) -> Registry<I2cBus> {
    let mut registry = Registry::new();
    registry.register(sys.backend().i2c()).unwrap();
    registry
}

// ---------------------------------------------------------------------------
// I2C
// ---------------------------------------------------------------------------

#[test]
fn i2c_without_node_is_no_device() {
    let sys = FakeSystem::new();
    let registry = i2c_registry(&sys);

    assert_eq!(
        registry.create_bus(&I2cParams::default()).unwrap_err(),
        Error::NoDevice
    );
}

#[test]
fn i2c_bus_number_from_params_and_uri() {
    let sys = FakeSystem::new();
    sys.add_node("i2c-1");
    let registry = i2c_registry(&sys);

    assert!(registry.create_bus(&I2cParams::default()).is_err());
    let bus = registry
        .create_bus(&I2cParams::default().with_busnum(1))
        .unwrap();
    assert_eq!(bus.backend(), "linuxdev");

    let bus = registry
        .create_bus(&I2cParams::default().with_uri("linuxdev:///1"))
        .unwrap();
    assert_eq!(bus.state(), BusState::Unopened);
}

#[test]
fn i2c_rejects_remote_uri() {
    let sys = FakeSystem::new();
    sys.add_node("i2c-1");
    let registry = i2c_registry(&sys);

    let params = I2cParams::default().with_uri("linuxdev://host/1");
    assert_eq!(registry.create_bus(&params).unwrap_err(), Error::InvalidUri);
}

#[test]
fn i2c_open_on_non_device_is_io_error() {
    let sys = FakeSystem::new();
    sys.add_node("i2c-0");
    let registry = i2c_registry(&sys);
    let mut bus = registry.create_bus(&I2cParams::default()).unwrap();

    // A regular file refuses the I2C_SLAVE ioctl.
    assert_eq!(bus.open(0x39).unwrap_err(), Error::IoError);
    assert_eq!(bus.open(0x80).unwrap_err(), Error::InvalidArgument);
    assert_eq!(bus.state(), BusState::Unopened);
}

// ---------------------------------------------------------------------------
// SPI
// ---------------------------------------------------------------------------

#[test]
fn spi_needs_a_node_on_the_bus() {
    let sys = FakeSystem::new();
    sys.add_node("spidev0.0");
    let mut registry = Registry::<SpiBus>::new();
    registry.register(sys.backend().spi()).unwrap();

    assert!(registry.create_bus(&SpiParams::default()).is_ok());
    assert_eq!(
        registry
            .create_bus(&SpiParams::default().with_busnum(1))
            .unwrap_err(),
        Error::NoDevice
    );
}

#[test]
fn spi_open_missing_chip_select_is_no_device() {
    let sys = FakeSystem::new();
    sys.add_node("spidev0.0");
    let mut registry = Registry::<SpiBus>::new();
    registry.register(sys.backend().spi()).unwrap();
    let mut bus = registry.create_bus(&SpiParams::default()).unwrap();

    assert_eq!(bus.open(1).unwrap_err(), Error::NoDevice);
    // The node exists but is not a spidev.
    assert_eq!(bus.open(0).unwrap_err(), Error::IoError);
}

// ---------------------------------------------------------------------------
// GPIO
// ---------------------------------------------------------------------------

fn gpio_chip(sys: &FakeSystem) -> GpioChip {
    let mut registry = Registry::<GpioChip>::new();
    registry.register(sys.backend().gpio()).unwrap();
    registry.create_bus(&GpioParams::default()).unwrap()
}

#[test]
fn gpio_without_sysfs_is_no_device() {
    let sys = FakeSystem::new();
    let mut registry = Registry::<GpioChip>::new();
    registry.register(sys.backend().gpio()).unwrap();

    assert_eq!(
        registry.create_bus(&GpioParams::default()).unwrap_err(),
        Error::NoDevice
    );
}

#[test]
fn gpio_output_round_trip() {
    let sys = FakeSystem::new();
    sys.add_gpio(&[17]);
    let mut chip = gpio_chip(&sys);

    let led = chip.open(17, PinMode::Output).unwrap();
    assert_eq!(sys.gpio_file("export"), "17");
    assert_eq!(sys.gpio_file("gpio17/direction"), "out");

    chip.write(led, PinValue::High).unwrap();
    assert_eq!(sys.gpio_file("gpio17/value"), "1");
    assert_eq!(chip.read(led), Ok(PinValue::High));

    chip.write(led, PinValue::Low).unwrap();
    assert_eq!(chip.read(led), Ok(PinValue::Low));

    chip.close(led).unwrap();
    assert_eq!(sys.gpio_file("unexport"), "17");
    assert_eq!(chip.read(led), Err(Error::InvalidHandle));
}

#[test]
fn gpio_inputs_are_read_only() {
    let sys = FakeSystem::new();
    sys.add_gpio(&[4, 5]);
    let mut chip = gpio_chip(&sys);

    let button = chip.open(4, PinMode::InputPullUp).unwrap();
    assert_eq!(sys.gpio_file("gpio4/direction"), "in");
    assert_eq!(chip.write(button, PinValue::High), Err(Error::InvalidArgument));

    fs::write(sys.root.path().join("gpio/gpio4/value"), b"1\n").unwrap();
    assert_eq!(chip.read(button), Ok(PinValue::High));

    assert_eq!(chip.open(4, PinMode::Input).unwrap_err(), Error::Busy);
}

#[test]
fn gpio_release_unexports_open_pins() {
    let sys = FakeSystem::new();
    sys.add_gpio(&[22]);
    let mut chip = gpio_chip(&sys);

    chip.open(22, PinMode::Output).unwrap();
    chip.release().unwrap();
    assert_eq!(sys.gpio_file("unexport"), "22");
    assert_eq!(chip.state(), BusState::Released);
}

#[test]
fn gpio_open_unknown_pin_is_io_error() {
    let sys = FakeSystem::new();
    sys.add_gpio(&[]);
    let mut chip = gpio_chip(&sys);

    assert_eq!(chip.open(99, PinMode::Input).unwrap_err(), Error::IoError);
    assert_eq!(chip.state(), BusState::Unopened);
}
