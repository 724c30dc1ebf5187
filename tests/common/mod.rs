//! Length-prefixed, XOR-checksummed test messages.
//!
//! A message is `[len, payload.., cksum]` where `len` is the payload
//! length and `cksum` the XOR of the payload bytes, so the consumer can
//! verify that every byte it reads was authored by exactly one producer.

/// Simple xorshift; the system RNG causes lock contention under stress.
pub fn fast_random(seed: &mut u32) -> u32 {
    let mut x = *seed;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    *seed = x;
    x
}

/// Generate a message into `buf`, returning its total length.
pub fn generate_message(seed: &mut u32, buf: &mut [u8]) -> usize {
    let len = (fast_random(seed) as usize) % (buf.len() - 2);
    let mut cksum = 0u8;

    for slot in buf.iter_mut().take(len + 1).skip(1) {
        let byte = b'!' + (fast_random(seed) % (b'~' - b'!') as u32) as u8;
        *slot = byte;
        cksum ^= byte;
    }
    // Write the length last.
    buf[len + 1] = cksum;
    buf[0] = len as u8;
    len + 2
}

/// Verify the message at the head of `buf`, returning its total length.
pub fn verify_message(buf: &[u8]) -> Option<usize> {
    let len = buf[0] as usize;
    if buf.len() < len + 2 {
        return None;
    }

    let mut cksum = 0u8;
    for byte in &buf[1..len + 1] {
        cksum ^= byte;
    }
    if buf[len + 1] != cksum {
        return None;
    }
    Some(len + 2)
}

#[test]
fn test_message_roundtrip() {
    let mut seed = 5381;
    let mut buf = [0u8; 255];

    for _ in 0..1000 {
        let len = generate_message(&mut seed, &mut buf);
        assert!((2..=buf.len()).contains(&len));
        assert_eq!(verify_message(&buf[..len]), Some(len));
    }
}

#[test]
fn test_corrupt_message_is_rejected() {
    let mut seed = 1234;
    let mut buf = [0u8; 64];

    // Make sure there is a payload byte to corrupt.
    let len = loop {
        let len = generate_message(&mut seed, &mut buf);
        if len > 2 {
            break len;
        }
    };

    buf[1] ^= 0xff;
    assert_eq!(verify_message(&buf[..len]), None);
}
