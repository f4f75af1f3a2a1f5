use super::*;

// -------------------- Construction --------------------

#[test]
fn new_creates_valid_filter() {
    let bf = BloomFilter::new(100, 0.01);
    assert!(bf.num_bits() > 0);
    assert!(bf.num_hashes() > 0);
    assert!(!bf.bits.is_empty());
}

#[test]
#[should_panic(expected = "expected_items must be > 0")]
fn new_panics_on_zero_items() {
    BloomFilter::new(0, 0.01);
}

#[test]
#[should_panic(expected = "false_positive_rate must be in (0, 1)")]
fn new_panics_on_zero_fpr() {
    BloomFilter::new(100, 0.0);
}

#[test]
#[should_panic(expected = "false_positive_rate must be in (0, 1)")]
fn new_panics_on_one_fpr() {
    BloomFilter::new(100, 1.0);
}

// -------------------- Insert / Contains --------------------

#[test]
fn inserted_key_is_found() {
    let mut bf = BloomFilter::new(100, 0.01);
    bf.insert(b"hello");
    assert!(bf.contains(b"hello"));
}

#[test]
fn missing_key_is_not_found() {
    let bf = BloomFilter::new(100, 0.01);
    assert!(!bf.contains(b"hello"));
}

#[test]
fn no_false_negatives() {
    let mut bf = BloomFilter::new(1000, 0.01);
    for i in 0..1000u64 {
        bf.insert(&i.to_be_bytes());
    }
    for i in 0..1000u64 {
        assert!(bf.contains(&i.to_be_bytes()), "key {} should be found", i);
    }
}

#[test]
fn false_positive_rate_is_reasonable() {
    let n = 10_000;
    let fpr = 0.01;
    let mut bf = BloomFilter::new(n, fpr);

    // Insert n keys
    for i in 0..n as u64 {
        bf.insert(&i.to_be_bytes());
    }

    // Probe 1000 keys that were NOT inserted
    let mut false_positives = 0;
    let probe_count = 1_000;
    for i in (n as u64)..(n as u64 + probe_count) {
        if bf.contains(&i.to_be_bytes()) {
            false_positives += 1;
        }
    }

    let actual_fpr = false_positives as f64 / probe_count as f64;
    // Must stay well under 5% for a filter targeted at 1%
    assert!(
        actual_fpr < 0.05,
        "FPR too high: {:.4} (target {:.4})",
        actual_fpr,
        fpr
    );
}

#[test]
fn empty_key() {
    let mut bf = BloomFilter::new(10, 0.01);
    bf.insert(b"");
    assert!(bf.contains(b""));
}

#[test]
fn binary_key() {
    let mut bf = BloomFilter::new(10, 0.01);
    let key = vec![0u8, 1, 2, 255, 254, 253];
    bf.insert(&key);
    assert!(bf.contains(&key));
}

// -------------------- Serialization --------------------

#[test]
fn roundtrip_serialize_deserialize() {
    let mut bf = BloomFilter::new(500, 0.01);
    for i in 0..500u64 {
        bf.insert(&i.to_be_bytes());
    }

    let buf = bf.serialize();
    assert_eq!(buf.len(), 16 + bf.bits.len());

    let bf2 = BloomFilter::deserialize(&buf).unwrap();

    assert_eq!(bf2.num_bits(), bf.num_bits());
    assert_eq!(bf2.num_hashes(), bf.num_hashes());
    assert_eq!(bf2.bits, bf.bits);

    // All inserted keys still found
    for i in 0..500u64 {
        assert!(
            bf2.contains(&i.to_be_bytes()),
            "key {} missing after roundtrip",
            i
        );
    }
}

#[test]
fn deserialize_rejects_truncated_header() {
    let result = BloomFilter::deserialize(&[0u8; 7]);
    assert!(result.is_err());
}

#[test]
fn deserialize_rejects_oversized_bloom() {
    // Craft a bloom with bits_len = 256 MiB (exceeds 128 MiB cap)
    let mut buf = Vec::new();
    buf.extend_from_slice(&64u64.to_be_bytes()); // num_bits
    buf.extend_from_slice(&3u32.to_be_bytes()); // num_hashes
    buf.extend_from_slice(&(256 * 1024 * 1024u32).to_be_bytes()); // bits_len = 256 MiB

    let result = BloomFilter::deserialize(&buf);
    assert!(result.is_err());
}

#[test]
fn deserialize_rejects_length_mismatch() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&64u64.to_be_bytes()); // num_bits
    buf.extend_from_slice(&3u32.to_be_bytes()); // num_hashes
    buf.extend_from_slice(&8u32.to_be_bytes()); // bits_len = 8
    buf.extend_from_slice(&[0u8; 4]); // only 4 bytes of bits

    let result = BloomFilter::deserialize(&buf);
    assert!(result.is_err());
}

// -------------------- Capacity estimate --------------------

#[test]
fn estimated_items_tracks_construction_size() {
    for n in [100usize, 1_000, 10_000] {
        let bf = BloomFilter::new(n, 0.01);
        let est = bf.estimated_items();
        // The inverse of the sizing formula is exact up to rounding.
        assert!(
            est >= n * 9 / 10 && est <= n * 11 / 10,
            "estimate {} too far from {}",
            est,
            n
        );
    }
}

// -------------------- Debug --------------------

#[test]
fn debug_impl_works() {
    let bf = BloomFilter::new(100, 0.01);
    let debug = format!("{:?}", bf);
    assert!(debug.contains("BloomFilter"));
    assert!(debug.contains("num_bits"));
    assert!(debug.contains("num_hashes"));
}

// -------------------- Edge cases --------------------

#[test]
fn single_item_filter() {
    let mut bf = BloomFilter::new(1, 0.01);
    bf.insert(b"only");
    assert!(bf.contains(b"only"));
}

#[test]
fn very_low_fpr() {
    let bf = BloomFilter::new(100, 0.0001);
    // Should have many bits and hashes
    assert!(bf.num_bits() > 1000);
    assert!(bf.num_hashes() > 5);
}

#[test]
fn high_fpr_still_works() {
    let mut bf = BloomFilter::new(100, 0.5);
    bf.insert(b"test");
    assert!(bf.contains(b"test"));
}
