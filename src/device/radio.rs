use uuid::Uuid;

use crate::device::types::PeripheralId;
use crate::error::DeviceError;

/// Commands the lifecycle engine issues to the bluetooth radio.
///
/// None of these block: the outcome of every operation arrives later as a
/// [`crate::device::types::RadioEvent`] on the channel the radio was created with.
/// Only the engine holds a `Radio`, which makes it the exclusive owner of the
/// physical connection.
pub trait Radio {
    fn is_powered_on(&self) -> bool;

    /// Reports failure with `RadioEvent::ScanFailed`.
    fn start_scan(&mut self, services: &[Uuid]);

    fn stop_scan(&mut self);

    /// Reports `RadioEvent::Connected`, or `RadioEvent::Disconnected` with a reason on failure.
    fn connect(&mut self, peripheral: &PeripheralId);

    /// Reports `RadioEvent::ServicesDiscovered`.
    fn discover_services(&mut self, peripheral: &PeripheralId);

    /// Enables local delivery of change notifications for `characteristic`. The peripheral will
    /// not push anything until the configuration descriptor has been written as well.
    fn enable_notifications(&mut self, peripheral: &PeripheralId, characteristic: Uuid) -> Result<(), DeviceError>;

    /// Reports `RadioEvent::DescriptorWritten`.
    fn write_descriptor(&mut self, peripheral: &PeripheralId, characteristic: Uuid, descriptor: Uuid, value: &[u8]);

    /// Disconnects (if still connected) and forgets the connection handle.
    fn release(&mut self, peripheral: &PeripheralId);
}
