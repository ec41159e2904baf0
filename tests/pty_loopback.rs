#![cfg(unix)]

//! Integration against real pseudo-terminals.
//!
//! A pty pair stands in for the serial device: the library opens the slave
//! side as its port while the test drives the master side as the peer. Line
//! discipline quirks aside, this exercises the real open/configure/read/write
//! syscall paths without hardware.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::{Duration, Instant};

use miniserial::{BaudRate, DataBits, Error, Parity, PortConfig, SerialPort, StopBits};
use pretty_assertions::assert_eq;

struct Pty {
    master: OwnedFd,
    // Keeps the slave side alive so the master never sees a hangup between
    // openpty and the library's own open of the path.
    _slave: OwnedFd,
    slave_path: String,
}

fn open_pty() -> Pty {
    let mut master: libc::c_int = 0;
    let mut slave: libc::c_int = 0;
    let mut name = [0 as libc::c_char; 128];

    let rc = unsafe {
        libc::openpty(
            &mut master,
            &mut slave,
            name.as_mut_ptr(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
    };
    assert_eq!(rc, 0, "openpty failed: {}", std::io::Error::last_os_error());

    let master = unsafe { OwnedFd::from_raw_fd(master) };
    let slave = unsafe { OwnedFd::from_raw_fd(slave) };

    // Non-blocking master so the peer helpers can poll.
    let flags = unsafe { libc::fcntl(master.as_raw_fd(), libc::F_GETFL) };
    assert!(flags >= 0);
    assert!(unsafe { libc::fcntl(master.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) } >= 0);

    let len = name.iter().position(|&c| c == 0).unwrap();
    let slave_path = name[..len].iter().map(|&c| c as u8 as char).collect();

    Pty {
        master,
        _slave: slave,
        slave_path,
    }
}

fn peer_send(pty: &Pty, data: &[u8]) {
    let n = unsafe {
        libc::write(
            pty.master.as_raw_fd(),
            data.as_ptr() as *const libc::c_void,
            data.len(),
        )
    };
    assert_eq!(n, data.len() as isize);
}

fn peer_recv(pty: &Pty, want: usize, deadline: Duration) -> Vec<u8> {
    let start = Instant::now();
    let mut out = Vec::new();
    let mut buf = [0u8; 256];
    while out.len() < want && start.elapsed() < deadline {
        let n = unsafe {
            libc::read(
                pty.master.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if n > 0 {
            out.extend_from_slice(&buf[..n as usize]);
        } else {
            std::thread::sleep(Duration::from_millis(5));
        }
    }
    out
}

#[test]
fn opening_a_nonexistent_device_fails_with_open_error() {
    let result = SerialPort::open("/dev/tty_miniserial_missing", PortConfig::default());
    match result {
        Err(Error::Open { port, .. }) => assert_eq!(port, "/dev/tty_miniserial_missing"),
        other => panic!("expected Open error, got {other:?}"),
    }
}

#[test]
fn written_bytes_reach_the_peer() {
    let pty = open_pty();
    let mut port = SerialPort::open(&pty.slave_path, PortConfig::default()).unwrap();

    let written = port.write(b"ping").unwrap();
    assert_eq!(written, 4);
    assert_eq!(peer_recv(&pty, 4, Duration::from_millis(500)), b"ping");
}

#[test]
fn read_collects_peer_bursts_in_arrival_order() {
    let pty = open_pty();
    let mut port = SerialPort::open(&pty.slave_path, PortConfig::default()).unwrap();

    let master_fd = pty.master.as_raw_fd();
    let writer = std::thread::spawn(move || {
        let send = |data: &[u8]| {
            let n = unsafe {
                libc::write(master_fd, data.as_ptr() as *const libc::c_void, data.len())
            };
            assert_eq!(n, data.len() as isize);
        };
        send(b"abc");
        std::thread::sleep(Duration::from_millis(60));
        send(b"de");
    });

    let data = port.read(Duration::from_millis(250)).unwrap();
    writer.join().unwrap();
    assert_eq!(data, b"abcde");
}

#[test]
fn zero_timeout_read_does_not_wait() {
    let pty = open_pty();
    let mut port = SerialPort::open(&pty.slave_path, PortConfig::default()).unwrap();

    let start = Instant::now();
    let data = port.read(Duration::ZERO).unwrap();
    assert_eq!(data, b"");
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[test]
fn reconfigure_commits_to_the_real_terminal() {
    let pty = open_pty();
    let mut port = SerialPort::open(&pty.slave_path, PortConfig::default()).unwrap();

    let config = PortConfig {
        baud_rate: BaudRate::Baud19200,
        parity: Parity::Even,
        data_bits: DataBits::Seven,
        stop_bits: StopBits::Two,
        timeout: Duration::from_millis(500),
    };
    port.reconfigure(config).unwrap();
    assert_eq!(port.config(), config);

    // Read the committed state back out of the terminal itself. Only the
    // speed is checked at the termios level: pty drivers normalize
    // hardware-only c_cflag bits (parity, character size) rather than
    // storing them verbatim, so those are covered by the config() readback
    // above and by the real-hardware tier.
    let mut tios: libc::termios = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::tcgetattr(pty._slave.as_raw_fd(), &mut tios) };
    assert_eq!(rc, 0);
    assert_eq!(unsafe { libc::cfgetospeed(&tios) }, libc::B19200);
}

#[test]
fn per_field_setter_keeps_unrelated_committed_state() {
    let pty = open_pty();
    let mut port = SerialPort::open(&pty.slave_path, PortConfig::default()).unwrap();

    port.set_parity(Parity::Odd).unwrap();
    port.set_baud(BaudRate::Baud38400).unwrap();

    let mut tios: libc::termios = unsafe { std::mem::zeroed() };
    assert_eq!(unsafe { libc::tcgetattr(pty._slave.as_raw_fd(), &mut tios) }, 0);
    assert_eq!(unsafe { libc::cfgetospeed(&tios) }, libc::B38400);
    // Parity from the earlier setter survived the baud commit. The pty
    // driver normalizes parity bits out of c_cflag, so the committed state
    // is checked through the port's own readback.
    let committed = port.config();
    assert_eq!(committed.parity, Parity::Odd);
    assert_eq!(committed.baud_rate, BaudRate::Baud38400);
    assert_eq!(committed.data_bits, DataBits::Eight);
}

#[test]
fn inexpressible_stop_bits_fail_closed_without_leaking_the_handle() {
    let pty = open_pty();
    let bad = PortConfig {
        stop_bits: StopBits::OnePointFive,
        ..PortConfig::default()
    };
    assert!(matches!(
        SerialPort::open(&pty.slave_path, bad),
        Err(Error::Config { .. })
    ));

    // The failed open released the handle: the same path opens cleanly.
    SerialPort::open(&pty.slave_path, PortConfig::default()).unwrap();
}

#[test]
fn flush_discards_pending_peer_data() {
    let pty = open_pty();
    let mut port = SerialPort::open(&pty.slave_path, PortConfig::default()).unwrap();

    peer_send(&pty, b"junk");
    std::thread::sleep(Duration::from_millis(50));
    assert!(port.available().unwrap() > 0);

    port.flush().unwrap();
    assert_eq!(port.available().unwrap(), 0);
    assert_eq!(port.read(Duration::ZERO).unwrap(), b"");
}

#[test]
fn dropping_the_port_releases_the_device_for_reopen() {
    let pty = open_pty();
    let port = SerialPort::open(&pty.slave_path, PortConfig::default()).unwrap();
    port.close();

    let mut port = SerialPort::open(&pty.slave_path, PortConfig::default()).unwrap();
    let written = port.write(b"ok").unwrap();
    assert_eq!(written, 2);
    assert_eq!(peer_recv(&pty, 2, Duration::from_millis(500)), b"ok");
}
