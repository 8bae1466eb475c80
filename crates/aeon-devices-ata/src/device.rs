//! One device slot on a channel.

use crate::drvs::{AbsentDriver, AtaDeviceDriver, IDENTIFY_DATA_LEN};

/// A device position (master or slave) and the driver strategy currently
/// plugged into it. The slot itself is permanent; the driver can be swapped
/// at runtime, which is how media changes and hot-attach are modeled.
pub struct AtaDevice {
    driver: Box<dyn AtaDeviceDriver>,
}

impl AtaDevice {
    pub fn new(driver: Box<dyn AtaDeviceDriver>) -> Self {
        Self { driver }
    }

    /// An empty slot: reads float, every command is refused.
    pub fn absent() -> Self {
        Self {
            driver: Box::new(AbsentDriver),
        }
    }

    /// Replace the driver without disturbing the channel wiring.
    pub fn set_driver(&mut self, driver: Box<dyn AtaDeviceDriver>) {
        self.driver = driver;
    }

    pub fn driver_mut(&mut self) -> &mut dyn AtaDeviceDriver {
        &mut *self.driver
    }

    pub fn is_attached(&self) -> bool {
        self.driver.is_attached()
    }

    pub fn is_packet_device(&self) -> bool {
        self.driver.is_packet_device()
    }

    pub fn identify(&self) -> [u8; IDENTIFY_DATA_LEN] {
        let mut data = [0u8; IDENTIFY_DATA_LEN];
        self.driver.identify(&mut data);
        data
    }

    pub fn sector_count(&self) -> u64 {
        self.driver.sector_count()
    }
}
