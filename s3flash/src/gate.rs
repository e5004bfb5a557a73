//! Device gate: acquiring and releasing the transport handle.
//!
//! Opening asks a [`PortSelector`] (the user or the environment) for a port.
//! Closing is idempotent so that every failure path can call it without
//! checking what happened before.

use log::{debug, warn};

use crate::{
    engine::FlasherEngine,
    error::{Error, Result},
    transport::Transport,
};

#[cfg(feature = "native")]
use crate::transport::{NativeTransport, SerialConfig};

/// Grants a device handle, e.g. by prompting the user to pick a port.
pub trait PortSelector: Send {
    /// Request an open transport.
    fn request_port(&mut self) -> Result<Box<dyn Transport>>;
}

impl<F> PortSelector for F
where
    F: FnMut() -> Result<Box<dyn Transport>> + Send,
{
    fn request_port(&mut self) -> Result<Box<dyn Transport>> {
        self()
    }
}

/// Opens a fixed, already known serial port.
#[cfg(feature = "native")]
#[derive(Debug, Clone)]
pub struct NativePortSelector {
    config: SerialConfig,
}

#[cfg(feature = "native")]
impl NativePortSelector {
    /// Select the port described by `config`.
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

#[cfg(feature = "native")]
impl PortSelector for NativePortSelector {
    fn request_port(&mut self) -> Result<Box<dyn Transport>> {
        Ok(Box::new(NativeTransport::open(&self.config)?))
    }
}

/// Owns the open/close lifecycle of the session transport.
pub struct DeviceGate {
    selector: Box<dyn PortSelector>,
}

impl DeviceGate {
    /// Create a gate backed by `selector`.
    pub fn new(selector: impl PortSelector + 'static) -> Self {
        Self {
            selector: Box::new(selector),
        }
    }

    /// Ask for a port. Any failure to obtain one becomes [`Error::DeviceUnavailable`].
    pub fn open(&mut self) -> Result<Box<dyn Transport>> {
        match self.selector.request_port() {
            Ok(transport) => {
                debug!("Port granted: {}", transport.name());
                Ok(transport)
            },
            Err(Error::DeviceUnavailable(msg)) => Err(Error::DeviceUnavailable(msg)),
            Err(e) => Err(Error::DeviceUnavailable(e.to_string())),
        }
    }

    /// Close a transport that was never bound to an engine.
    ///
    /// Does nothing for `None` or an already closed handle. Close errors are
    /// logged and dropped.
    pub fn close(transport: &mut Option<Box<dyn Transport>>) {
        if let Some(mut t) = transport.take() {
            if t.is_open() {
                if let Err(e) = t.close() {
                    warn!("Closing {} failed: {e}", t.name());
                }
            }
        }
    }

    /// Close the transport owned by `engine`, with the same guarantees as
    /// [`DeviceGate::close`].
    pub fn release(engine: &mut dyn FlasherEngine) {
        if !engine.transport().is_open() {
            return;
        }
        if let Err(e) = engine.close() {
            let err = Error::Close(e.to_string());
            warn!("{err}");
        }
    }
}

impl std::fmt::Debug for DeviceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceGate").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;

    struct CountingTransport {
        open: bool,
        closes: Arc<AtomicUsize>,
    }

    impl Read for CountingTransport {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    impl Write for CountingTransport {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Transport for CountingTransport {
        fn name(&self) -> &str {
            "fake"
        }

        fn baud_rate(&self) -> u32 {
            115_200
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn close(&mut self) -> Result<()> {
            self.open = false;
            self.closes.fetch_add(1, Ordering::SeqCst);
            Err(Error::Close("device vanished".into()))
        }
    }

    #[test]
    fn test_open_maps_failures_to_device_unavailable() {
        let mut gate = DeviceGate::new(|| -> Result<Box<dyn Transport>> {
            Err(Error::Unsupported("no permission".into()))
        });
        let err = gate.open().unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable(ref m) if m.contains("no permission")));
    }

    #[test]
    fn test_close_is_idempotent_and_swallows_errors() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut handle: Option<Box<dyn Transport>> = Some(Box::new(CountingTransport {
            open: true,
            closes: Arc::clone(&closes),
        }));

        DeviceGate::close(&mut handle);
        DeviceGate::close(&mut handle);
        DeviceGate::close(&mut None);

        assert!(handle.is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
