//! Integration tests for the driver session
//!
//! Drives the public API against the scripted mock transport:
//! - startup and rollback
//! - sequence number correlation
//! - output mirror semantics for masked writes
//! - teardown guarantees

use proptest::prelude::*;
use usbio::test_utils::{MockCall, MockHandle, MockRead, MockTransport, mock_device};
use usbio::{
    OutputState, SequenceNumber, Session, SessionOptions, SessionState, UsbIoError, read,
    read_and_write, shutdown, write,
};

fn start(transport: &MockTransport) -> Session<MockHandle> {
    Session::initialize(transport, &SessionOptions::default()).unwrap()
}

mod lifecycle {
    use super::*;

    #[test]
    fn test_end_to_end() {
        let transport = MockTransport::with_usbio();
        let mut session = start(&transport);
        assert_eq!(session.state(), SessionState::Claimed);

        write(&mut session, 0x01, 0x01).unwrap();
        assert_eq!(transport.latched_output(), 0x01);
        assert_eq!(session.output_status(), OutputState(0x01));

        transport.set_input(0x05);
        assert_eq!(read(&mut session).unwrap(), 0x05);

        shutdown(session, true);
        assert_eq!(transport.open_handles(), 0);
        assert_eq!(transport.calls().last(), Some(&MockCall::Reset));
    }

    #[test]
    fn test_no_device_returns_not_found_without_leak() {
        let transport = MockTransport::new();
        transport.add_device(mock_device(1, 1, 0x1d6b, 0x0002));

        let err = Session::initialize(&transport, &SessionOptions::default()).unwrap_err();
        assert!(matches!(err.root_cause(), UsbIoError::DeviceNotFound { .. }));
        assert_eq!(transport.open_handles(), 0);
        assert!(
            !transport
                .calls()
                .iter()
                .any(|c| matches!(c, MockCall::Open { .. }))
        );
    }

    #[test]
    fn test_device_gone_after_reset() {
        let transport = MockTransport::with_usbio();
        let options = SessionOptions {
            reset_first: true,
            ..Default::default()
        };
        transport.fail_open(rusb::Error::NoDevice);

        let err = Session::initialize(&transport, &options).unwrap_err();
        assert!(matches!(err.root_cause(), UsbIoError::OpenFailed { .. }));
        assert_eq!(err.usb_error(), Some(rusb::Error::NoDevice));
        assert_eq!(transport.open_handles(), 0);
    }

    #[test]
    fn test_configure_failure_rolls_back() {
        let transport = MockTransport::with_usbio();
        transport.fail_configure(2);

        let err = Session::initialize(&transport, &SessionOptions::default()).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            UsbIoError::ConfigureFailed { value: 1, .. }
        ));
        assert_eq!(transport.open_handles(), 0);
        assert!(
            !transport
                .calls()
                .iter()
                .any(|c| matches!(c, MockCall::ClaimInterface(_)))
        );
    }

    #[test]
    fn test_kernel_driver_conflict_is_transparent() {
        let transport = MockTransport::with_usbio();
        transport.fail_configure(1);
        transport.fail_claim(1);

        let session = start(&transport);
        assert_eq!(session.state(), SessionState::Claimed);
        let detaches = transport
            .calls()
            .iter()
            .filter(|c| matches!(c, MockCall::DetachKernelDriver(0)))
            .count();
        assert_eq!(detaches, 2);
    }

    #[test]
    fn test_shutdown_releases_even_if_reset_fails() {
        let transport = MockTransport::with_usbio();
        let session = start(&transport);
        transport.fail_reset(rusb::Error::NoDevice);
        transport.fail_detach(rusb::Error::NotFound);

        session.shutdown(true);
        assert_eq!(transport.open_handles(), 0);
    }

    #[test]
    fn test_graceful_close_releases_even_if_close_fails() {
        let transport = MockTransport::with_usbio();
        let session = start(&transport);
        transport.fail_close(rusb::Error::Io);

        session.shutdown(false);
        assert_eq!(transport.open_handles(), 0);
        assert!(!transport.calls().contains(&MockCall::Reset));
    }

    #[test]
    fn test_second_session_after_reset_shutdown() {
        let transport = MockTransport::with_usbio();
        start(&transport).shutdown(true);

        let mut session = start(&transport);
        assert_eq!(session.sequence_number(), SequenceNumber(0));
        session.read().unwrap();
        assert_eq!(session.sequence_number(), SequenceNumber(1));
    }
}

mod exchange {
    use super::*;

    #[test]
    fn test_never_matching_sequence_times_out_after_20_reads() {
        let transport = MockTransport::with_usbio();
        let mut session = start(&transport);
        transport.set_fallback_read(MockRead::Stale);

        let err = session.read().unwrap_err();
        assert!(matches!(
            err,
            UsbIoError::ResponseTimeout { attempts: 20, .. }
        ));
        assert_eq!(transport.read_attempts(), 20);
    }

    #[test]
    fn test_session_usable_after_timeout() {
        let transport = MockTransport::with_usbio();
        let mut session = start(&transport);
        for _ in 0..20 {
            transport.push_read(MockRead::Fail(rusb::Error::Timeout));
        }

        assert!(session.write(0xff, 0x0f).is_err());
        assert_eq!(session.output_status(), OutputState(0));

        transport.set_input(0x0c);
        assert_eq!(read_and_write(&mut session, 0xff, 0x0f).unwrap(), 0x0c);
        assert_eq!(session.output_status(), OutputState(0x0f));
        assert_eq!(session.sequence_number(), SequenceNumber(2));
    }

    #[test]
    fn test_read_write_returns_input_and_writes() {
        let transport = MockTransport::with_usbio();
        let mut session = start(&transport);
        transport.push_read(MockRead::EchoInput(0x09));

        assert_eq!(session.read_write(0x80, 0x80).unwrap(), 0x09);
        assert_eq!(transport.latched_output(), 0x80);
    }

    #[test]
    fn test_pure_read_commands_are_zero_payload() {
        let transport = MockTransport::with_usbio();
        let mut session = start(&transport);
        session.write(0xff, 0xff).unwrap();
        session.read().unwrap();

        let commands = transport.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(&commands[0][..3], &[0x20, 0x01, 0xff]);
        assert_eq!(&commands[1][..3], &[0x20, 0x00, 0x00]);
    }
}

mod properties {
    use super::*;

    #[derive(Debug, Clone)]
    enum Op {
        Read,
        Write { data: u8, mask: u8 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Read),
            (any::<u8>(), any::<u8>()).prop_map(|(data, mask)| Op::Write { data, mask }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn sequence_advances_by_one_per_command(ops in prop::collection::vec(op(), 1..300)) {
            let transport = MockTransport::with_usbio();
            let mut session = start(&transport);

            let mut expected = 0u8;
            for op in &ops {
                match op {
                    Op::Read => { session.read().unwrap(); }
                    Op::Write { data, mask } => session.write(*data, *mask).unwrap(),
                }
                expected = expected.wrapping_add(1);
                prop_assert_eq!(session.sequence_number(), SequenceNumber(expected));
            }

            let sequences: Vec<u8> = transport.commands().iter().map(|c| c[63]).collect();
            for pair in sequences.windows(2) {
                prop_assert_eq!(pair[1], pair[0].wrapping_add(1));
            }
        }

        #[test]
        fn masked_write_merges_into_previous_state(
            initial in any::<u8>(),
            data in any::<u8>(),
            mask in any::<u8>(),
        ) {
            let transport = MockTransport::with_usbio();
            let mut session = start(&transport);
            session.write(initial, 0xff).unwrap();

            session.write(data, mask).unwrap();
            let expected = (initial & !mask) | (data & mask);
            prop_assert_eq!(session.output_status(), OutputState(expected));
            prop_assert_eq!(transport.latched_output(), expected);

            // Writing the same pair again changes nothing
            session.write(data, mask).unwrap();
            prop_assert_eq!(session.output_status(), OutputState(expected));
        }

        #[test]
        fn read_never_alters_output_state(initial in any::<u8>(), reads in 1usize..10) {
            let transport = MockTransport::with_usbio();
            let mut session = start(&transport);
            session.write(initial, 0xff).unwrap();

            for _ in 0..reads {
                session.read().unwrap();
                prop_assert_eq!(session.output_status(), OutputState(initial));
            }
        }

        #[test]
        fn response_accepted_only_with_matching_sequence(stale in 0usize..5, input in any::<u8>()) {
            let transport = MockTransport::with_usbio();
            let mut session = start(&transport);
            transport.set_input(input);
            for _ in 0..stale {
                transport.push_read(MockRead::Stale);
            }

            prop_assert_eq!(session.read().unwrap(), input);
            prop_assert_eq!(transport.read_attempts(), stale + 1);
        }
    }
}
