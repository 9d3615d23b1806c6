//! Whole-system tests: programs running against the real memory fabric,
//! DMA over the serial port, and video scan-out.

use machine_sbc::{Machine, MachineConfig, MachineError};
use soc_core::{Clocked, Cycles, Inspect};
use soc_uart::{UartConfig, UartRx};

// Small wire timings keep the tests fast: 4 cycles per bit.
const CLOCK_HZ: u32 = 16;
const BAUD: u32 = 4;

fn base_config() -> MachineConfig {
    serde_json::from_str(
        r#"{ "clock_hz": 16, "num_bytes": 65536, "uart": { "baud_rate": 4 } }"#,
    )
    .expect("config must parse")
}

fn video_config() -> MachineConfig {
    serde_json::from_str(
        r#"{
            "clock_hz": 16,
            "num_bytes": 36864,
            "video": {
                "input_width": 32, "input_height": 32,
                "framebuffer_address": 32768,
                "timing": {
                    "h_active": 64, "h_front_porch": 8, "h_sync": 8, "h_back_porch": 8,
                    "v_active": 64, "v_front_porch": 2, "v_sync": 2, "v_back_porch": 2
                }
            }
        }"#,
    )
    .expect("config must parse")
}

// Minimal RV32I encoders for the guest programs below.

fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
    ((imm as u32) & 0xFFF) << 20 | rs1 << 15 | rd << 7 | 0b001_0011
}

fn sw(rs2: u32, rs1: u32, imm: i32) -> u32 {
    let imm = imm as u32;
    (imm >> 5 & 0x7F) << 25 | rs2 << 20 | rs1 << 15 | 0b010 << 12 | (imm & 0x1F) << 7 | 0b010_0011
}

fn lw(rd: u32, rs1: u32, imm: i32) -> u32 {
    ((imm as u32) & 0xFFF) << 20 | rs1 << 15 | 0b010 << 12 | rd << 7 | 0b000_0011
}

fn ecall() -> u32 {
    0x0000_0073
}

/// jal x0, 0: park the hart in place.
fn park() -> u32 {
    0b110_1111
}

fn program_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

fn load_program(machine: &mut Machine, words: &[u32]) {
    machine
        .load_image(0, &program_bytes(words))
        .expect("program fits");
}

#[test]
fn boot_empty_halts_without_memory_mutation() {
    let mut machine = Machine::new(&base_config()).expect("valid config");
    machine.clear();
    for _ in 0..100 {
        machine.step();
    }
    assert!(machine.hart_halted(0), "all-zero instruction must halt");
    for word in 0..64 {
        assert_eq!(machine.peek_word(word * 4), 0, "memory must stay untouched");
    }
}

#[test]
fn echo_via_dma_emits_a_framed_packet() {
    let mut machine = Machine::new(&base_config()).expect("valid config");
    // Guest: request outbound DMA of the 5 bytes at 0x78, then park.
    load_program(
        &mut machine,
        &[
            addi(5, 0, 0),    // x5 = mode 0 (send)
            addi(6, 0, 0x78), // x6 = source address
            addi(7, 0, 5),    // x7 = length
            ecall(),
            park(),
        ],
    );
    machine.load_image(0x78, b"HELLO").expect("message fits");
    machine.clear();

    // Decode the TX wire independently to prove the bytes really go out
    // through the serial PHY.
    let mut wire_rx = UartRx::new(&UartConfig {
        clock_hz: CLOCK_HZ,
        baud_rate: BAUD,
        parity: false,
        stop_bits: 1,
    });
    let mut wire_bytes = Vec::new();
    for _ in 0..20_000 {
        machine.step();
        wire_rx.tick(machine.tx_line());
        if let Some(byte) = wire_rx.output.take() {
            assert!(!byte.parity_error && !byte.stop_bit_unstable);
            wire_bytes.push(byte.data);
        }
        if wire_bytes.len() == 12 {
            break;
        }
    }

    let expected = [
        0x51, 0x00, 0x09, // header, length = 4 + 5
        0x00, 0x00, 0x00, 0x78, // address
        0x48, 0x45, 0x4C, 0x4C, 0x4F, // "HELLO"
    ];
    assert_eq!(wire_bytes, expected);
    assert_eq!(machine.take_serial_output(), expected);
    assert_eq!(
        machine.hart_registers(0).read(10),
        1,
        "guest must see the request accepted"
    );
    assert!(!machine.hart_halted(0));
}

#[test]
fn second_dma_request_while_busy_is_refused() {
    let mut machine = Machine::new(&base_config()).expect("valid config");
    load_program(
        &mut machine,
        &[
            addi(5, 0, 0),
            addi(6, 0, 0x78),
            addi(7, 0, 64), // long enough to keep the transmitter busy
            ecall(),
            addi(28, 10, 0), // x28 = first result
            ecall(),
            addi(29, 10, 0), // x29 = second result
            park(),
        ],
    );
    machine.clear();
    for _ in 0..200 {
        machine.step();
    }

    assert_eq!(machine.hart_registers(0).read(28), 1, "first request accepted");
    assert_eq!(machine.hart_registers(0).read(29), 0, "second must see busy");
}

#[test]
fn load_store_round_trip_through_the_fabric() {
    let mut machine = Machine::new(&base_config()).expect("valid config");
    // addi x1, x0, 0x123 ; sw x1, 0x100(x0) ; lw x2, 0x100(x0) ; park
    load_program(
        &mut machine,
        &[addi(1, 0, 0x123), sw(1, 0, 0x100), lw(2, 0, 0x100), park()],
    );
    machine.clear();
    for _ in 0..200 {
        machine.step();
    }

    let regs = machine.hart_registers(0);
    assert_eq!(regs.read(1), 0x123);
    assert_eq!(regs.read(2), 0x123);
    assert_eq!(machine.peek_byte(0x100), 0x23);
    assert_eq!(machine.peek_byte(0x101), 0x01);
    assert_eq!(machine.peek_byte(0x102), 0x00);
    assert_eq!(machine.peek_byte(0x103), 0x00);
}

#[test]
fn program_delivered_over_the_wire_runs_after_clear() {
    let mut machine = Machine::new(&base_config()).expect("valid config");
    machine.clear();
    // The hart halts on the all-zero word almost immediately; the serial
    // port then seeds memory, exactly like a host programmer would.
    let program = program_bytes(&[addi(1, 0, 7), sw(1, 0, 0x200), park()]);
    let length = (4 + program.len()) as u16;
    let mut packet = vec![0x51, (length >> 8) as u8, length as u8, 0, 0, 0, 0];
    packet.extend_from_slice(&program);

    // Bit-bang each byte onto the RX wire: start, 8 data LSB-first, stop.
    let period = CLOCK_HZ / BAUD;
    for &byte in &packet {
        let mut bits = vec![false];
        for i in 0..8 {
            bits.push(byte & (1 << i) != 0);
        }
        bits.push(true);
        for bit in bits {
            machine.set_rx_line(bit);
            for _ in 0..period {
                machine.step();
            }
        }
    }
    machine.set_rx_line(true);
    for _ in 0..200 {
        machine.step();
    }
    assert_eq!(machine.peek_word(0), addi(1, 0, 7), "program landed at 0");

    // Restart with memory preserved.
    machine.clear();
    for _ in 0..200 {
        machine.step();
    }
    assert_eq!(machine.hart_registers(0).read(1), 7);
    assert_eq!(machine.peek_word(0x200), 7);
    assert!(!machine.hart_halted(0));
}

#[test]
fn byte_level_serial_input_bypasses_the_phy() {
    let mut machine = Machine::new(&base_config()).expect("valid config");
    machine.clear();
    let packet = [0x51, 0x00, 0x05, 0x00, 0x00, 0x00, 0x20, 0xAB];
    for &byte in &packet {
        while !machine.serial_input(byte) {
            machine.step();
        }
        machine.step();
    }
    for _ in 0..50 {
        machine.step();
    }
    assert_eq!(machine.peek_byte(0x20), 0xAB);
}

#[test]
fn framebuffer_bit_renders_as_scaled_block() {
    let mut machine = Machine::new(&video_config()).expect("valid config");
    // Bit (3,3) of the 32x32 framebuffer: bit index 99 = word 3, bit 3.
    machine.load_image(0x8000 + 12, &[0x08]).expect("fits");
    machine.clear();

    let mut frame = vec![vec![false; 64]; 64];
    let mut started = false;
    let mut saw_hsync = false;
    let mut saw_vsync = false;
    for _ in 0..3 * 88 * 70 {
        machine.step();
        let video = machine.video_mut().expect("video configured");
        if video.take_frame_complete() {
            if started {
                break;
            }
            started = true;
        }
        let video = machine.video().expect("video configured");
        saw_hsync |= video.hsync();
        saw_vsync |= video.vsync();
        if started && video.data_enable() {
            let (x, y) = video.beam();
            frame[y as usize][x as usize] = video.pixel();
        }
    }
    assert!(saw_hsync && saw_vsync, "sync pulses must reach the display");

    for y in 0..64 {
        for x in 0..64 {
            let expected = (6..=7).contains(&x) && (6..=7).contains(&y);
            assert_eq!(frame[y][x], expected, "pixel ({x},{y})");
        }
    }
    assert_eq!(
        machine.video().expect("video configured").cache_misses(),
        0,
        "scan-out must meet every pixel deadline"
    );
}

#[test]
fn secondary_hart_ecall_gets_the_default_transaction() {
    let mut config = base_config();
    config.num_harts = 2;
    let mut machine = Machine::new(&config).expect("valid config");
    // Both harts run the same image: ecall, then a marker, then park.
    load_program(&mut machine, &[addi(5, 0, 1), ecall(), addi(1, 0, 9), park()]);
    machine.clear();
    for _ in 0..400 {
        machine.step();
    }

    assert_eq!(machine.num_harts(), 2);
    for hart in 0..machine.num_harts() {
        assert!(!machine.hart_halted(hart));
        assert_eq!(
            machine.hart_registers(hart).read(1),
            9,
            "hart {hart} must continue past the ecall"
        );
    }
}

#[test]
fn clocked_run_advances_the_cycle_counter() {
    let mut machine = Machine::new(&base_config()).expect("valid config");
    machine.clear();
    machine.run(Cycles::new(250));
    assert_eq!(machine.cycles(), Cycles::new(250));
}

#[test]
fn clear_preserves_memory() {
    let mut machine = Machine::new(&base_config()).expect("valid config");
    machine.load_image(0x300, &[1, 2, 3, 4]).expect("fits");
    machine.clear();
    assert_eq!(machine.peek_word(0x300), 0x0403_0201);
}

#[test]
fn invalid_configurations_are_rejected() {
    let mut config = base_config();
    config.num_bytes = 0;
    assert!(matches!(
        Machine::new(&config),
        Err(MachineError::ZeroCapacity)
    ));

    let mut config = base_config();
    config.num_harts = 0;
    assert!(matches!(Machine::new(&config), Err(MachineError::NoHarts)));

    let mut config = video_config();
    let video = config.video.as_mut().expect("video present");
    video.input_width = 60; // 64 is not a multiple of 60
    assert!(matches!(
        Machine::new(&config),
        Err(MachineError::NonIntegerScale { .. })
    ));

    let machine = Machine::new(&base_config()).expect("valid config");
    let mut machine = machine;
    assert!(matches!(
        machine.load_image(65534, &[0; 8]),
        Err(MachineError::ImageTooLarge { .. })
    ));
}

#[test]
fn probe_paths_reach_hart_state() {
    let mut machine = Machine::new(&base_config()).expect("valid config");
    load_program(&mut machine, &[addi(1, 0, 5), park()]);
    machine.clear();
    for _ in 0..100 {
        machine.step();
    }

    assert_eq!(machine.probe("hart0.x1"), Some(soc_core::Value::Word(5)));
    assert_eq!(
        machine.probe("hart0.halted"),
        Some(soc_core::Value::Bit(false))
    );
    assert!(machine.probe("hart9.pc").is_none());
    assert!(machine.probes().contains(&"hart0.pc"));
}
