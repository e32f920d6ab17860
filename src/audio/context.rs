// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
// The process-wide output context. Opening an output is deferred until something first needs
// it and every later caller shares the same one until it is closed.
//

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::audio::{cpal, mock, AudioError, OutputSink};

static SHARED_OUTPUT: Mutex<Option<Arc<dyn OutputSink>>> = Mutex::new(None);

/// Returns the shared output, creating it with `create` if there is none or the previous one
/// was closed.
pub fn shared_output<F>(create: F) -> Result<Arc<dyn OutputSink>, AudioError>
where
    F: FnOnce() -> Result<Arc<dyn OutputSink>, AudioError>,
{
    let mut shared = SHARED_OUTPUT.lock();
    if let Some(output) = shared.as_ref() {
        if !output.is_closed() {
            return Ok(output.clone());
        }
        debug!("Shared output was closed, opening a new one");
    }

    let output = create()?;
    *shared = Some(output.clone());
    Ok(output)
}

/// Returns the shared output, opening the named device if needed. Names starting with "mock"
/// select the mock device.
pub fn output_for_device(device: &str) -> Result<Arc<dyn OutputSink>, AudioError> {
    shared_output(|| {
        info!(device, "Opening audio output");
        if device.starts_with("mock") {
            return Ok(Arc::new(mock::Device::get(device)));
        }
        Ok(Arc::new(cpal::Device::open(device)?))
    })
}

/// Closes and forgets the shared output.
pub fn release_shared_output() {
    if let Some(output) = SHARED_OUTPUT.lock().take() {
        output.close();
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use serial_test::serial;

    use super::*;
    use crate::audio::mock::{Device, ManualClock};

    fn mock_output() -> Result<Arc<dyn OutputSink>, AudioError> {
        Ok(Arc::new(Device::with_time_source(
            "mock",
            Arc::new(ManualClock::new()),
        )))
    }

    #[test]
    #[serial]
    fn output_is_created_once() {
        release_shared_output();

        let first = shared_output(mock_output).unwrap();
        let second = shared_output(|| panic!("should reuse the existing output")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        release_shared_output();
        assert!(first.is_closed());
    }

    #[test]
    #[serial]
    fn closed_output_is_replaced() {
        release_shared_output();

        let first = shared_output(mock_output).unwrap();
        first.close();
        let second = shared_output(mock_output).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_closed());

        release_shared_output();
    }

    #[test]
    #[serial]
    fn mock_device_by_name() {
        release_shared_output();
        let output = output_for_device("mock-device").unwrap();
        assert!(!output.is_closed());
        release_shared_output();
    }
}
