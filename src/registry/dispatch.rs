//! Forwarding calls to a connection's resolved entry point.

use std::ffi::{c_char, c_int};

use tracing::trace;

use super::{ConnectionId, Registry, Slot};
use crate::error::DispatchError;
use crate::loader::Loader;
use crate::payload::Payload;

/// Borrowed DISCON call buffers.
///
/// The contents are the controller's business: lengths stored inside `swap`
/// by convention are passed through untouched.
#[derive(Debug)]
pub struct DisconArgs<'a> {
    /// `avrSWAP`
    pub swap: &'a mut [f32],
    /// `aviFAIL`
    pub fail: &'a mut i32,
    /// `accINFILE`
    pub in_file: &'a mut [u8],
    /// `avcOUTNAME`
    pub out_name: &'a mut [u8],
    /// `avcMSG`
    pub msg: &'a mut [u8],
}

impl DisconArgs<'_> {
    // A zero-length buffer has no storage behind its pointer at all.
    fn check(&self) -> Result<(), DispatchError> {
        if self.swap.is_empty() {
            return Err(DispatchError::EmptyBuffer("avrSWAP"));
        }
        if self.in_file.is_empty() {
            return Err(DispatchError::EmptyBuffer("accINFILE"));
        }
        if self.out_name.is_empty() {
            return Err(DispatchError::EmptyBuffer("avcOUTNAME"));
        }
        if self.msg.is_empty() {
            return Err(DispatchError::EmptyBuffer("avcMSG"));
        }
        Ok(())
    }
}

impl<L: Loader> Registry<L> {
    /// Call the controller loaded on `conn` with `args`, in place.
    ///
    /// Blocks until the controller returns. The connection's slot stays locked
    /// for the duration, so a concurrent `unload` or `load` of the same
    /// connection waits for the call to finish; other connections are not
    /// affected.
    pub fn invoke(&self, conn: ConnectionId, args: &mut DisconArgs<'_>) -> Result<(), DispatchError> {
        self.index(conn)?;
        args.check()?;
        let fail: *mut i32 = &mut *args.fail;
        // Safety: every pointer comes from a live, exclusive, non-empty borrow
        // that outlasts the call.
        unsafe {
            self.invoke_raw(
                conn,
                args.swap.as_mut_ptr(),
                fail,
                args.in_file.as_mut_ptr().cast(),
                args.out_name.as_mut_ptr().cast(),
                args.msg.as_mut_ptr().cast(),
            )
        }
    }

    /// Call the controller loaded on `conn` with raw buffers.
    ///
    /// # Safety
    /// The pointers must be valid for whatever the loaded controller reads or
    /// writes through them, for the duration of the call.
    pub unsafe fn invoke_raw(
        &self,
        conn: ConnectionId,
        swap: *mut f32,
        fail: *mut c_int,
        in_file: *mut c_char,
        out_name: *mut c_char,
        msg: *mut c_char,
    ) -> Result<(), DispatchError> {
        let index = self.index(conn)?;
        let slot = self.lock_slot(index);
        let Slot::Loaded(controller) = &*slot else {
            return Err(DispatchError::NotLoaded { id: conn });
        };
        trace!(conn, symbol = %controller.symbol, "calling controller");
        (controller.entry)(swap, fail, in_file, out_name, msg);
        Ok(())
    }

    /// Call the controller loaded on `conn` with the buffers of `payload`.
    pub fn invoke_payload(&self, conn: ConnectionId, payload: &mut Payload) -> Result<(), DispatchError> {
        trace!(conn, "payload before call:\n{}", payload);
        self.invoke(conn, &mut payload.as_args())?;
        trace!(conn, "payload after call:\n{}", payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::StaticLoader;
    use std::sync::Arc;

    unsafe extern "C" fn echo_fail_into_swap(
        swap: *mut f32,
        fail: *mut c_int,
        _in_file: *mut c_char,
        _out_name: *mut c_char,
        msg: *mut c_char,
    ) {
        *swap = *fail as f32;
        *fail = 0;
        *msg = b'k' as c_char;
    }

    fn registry() -> Registry<Arc<StaticLoader>> {
        let loader = StaticLoader::new().with_symbol("ctrl", "DISCON", echo_fail_into_swap);
        Registry::with_capacity(Arc::new(loader), 2)
    }

    #[test]
    fn test_invoke_mutates_buffers_in_place() {
        let registry = registry();
        registry.load(0, "ctrl", "DISCON").unwrap();

        let mut swap = [0.0f32; 4];
        let mut fail = 5;
        let mut in_file = *b"in\0";
        let mut out_name = *b"out\0";
        let mut msg = [0u8; 8];
        let mut args = DisconArgs {
            swap: &mut swap,
            fail: &mut fail,
            in_file: &mut in_file,
            out_name: &mut out_name,
            msg: &mut msg,
        };
        registry.invoke(0, &mut args).unwrap();

        assert_eq!(swap[0], 5.0);
        assert_eq!(fail, 0);
        assert_eq!(msg[0], b'k');
        assert_eq!(&in_file, b"in\0");
    }

    #[test]
    fn test_invoke_empty_and_failed_slots() {
        let registry = registry();
        let mut payload = Payload::with_capacity(8, 8);

        assert_eq!(
            registry.invoke_payload(0, &mut payload),
            Err(DispatchError::NotLoaded { id: 0 })
        );

        assert!(registry.load(1, "ctrl", "missing").is_err());
        assert_eq!(
            registry.invoke_payload(1, &mut payload),
            Err(DispatchError::NotLoaded { id: 1 })
        );
        assert!(matches!(
            registry.invoke_payload(2, &mut payload),
            Err(DispatchError::InvalidConnectionId(_))
        ));
    }

    #[test]
    fn test_empty_buffers_are_rejected_before_the_call() {
        let registry = registry();
        registry.load(0, "ctrl", "DISCON").unwrap();

        let mut payload = Payload::with_capacity(8, 8);
        payload.msg.clear();
        assert_eq!(
            registry.invoke_payload(0, &mut payload),
            Err(DispatchError::EmptyBuffer("avcMSG"))
        );

        let mut payload = Payload::with_capacity(0, 8);
        payload.fail = 3;
        assert_eq!(
            registry.invoke_payload(0, &mut payload),
            Err(DispatchError::EmptyBuffer("avrSWAP"))
        );
        assert_eq!(payload.fail, 3);
    }

    #[test]
    fn test_bad_connection_id_wins_over_empty_buffer() {
        let registry = registry();
        let mut payload = Payload::with_capacity(0, 8);

        assert!(matches!(
            registry.invoke_payload(5, &mut payload),
            Err(DispatchError::InvalidConnectionId(_))
        ));
        assert!(matches!(
            registry.invoke_payload(-1, &mut payload),
            Err(DispatchError::InvalidConnectionId(_))
        ));
        // a valid id still reports the buffer
        assert_eq!(
            registry.invoke_payload(1, &mut payload),
            Err(DispatchError::EmptyBuffer("avrSWAP"))
        );
    }
}
