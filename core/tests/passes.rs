use std::collections::HashSet;

use shroud_core::{
    bytecode::Opcode,
    passes::{
        constants::{Constant, ConstantEncryptor, EncryptionFlags, PoolEntry, encrypt_bytes, encrypt_integer},
        identifiers::{IdentifierObfuscator, LUA_KEYWORDS},
        opcodes::OpcodeMap,
    },
    rng::ShroudRng,
};

fn all_on() -> ConstantEncryptor {
    ConstantEncryptor::new(EncryptionFlags { strings: true, numbers: true, booleans: true })
}

fn same(a: &Constant, b: &Constant) -> bool {
    match (a, b) {
        (Constant::Float(x), Constant::Float(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

#[test]
fn every_literal_survives_encryption() {
    let values = vec![
        Constant::Integer(0),
        Constant::Integer(1),
        Constant::Integer(-1),
        Constant::Integer(42),
        Constant::Integer(1 << 31),
        Constant::Integer(-(1 << 31)),
        Constant::Integer(i64::MAX),
        Constant::Integer(i64::MIN),
        Constant::Float(0.5),
        Constant::Float(-3.25),
        Constant::Float(1e300),
        Constant::Float(123456.789),
        Constant::Float(0.0),
        Constant::Float(f64::INFINITY),
        Constant::String(Vec::new()),
        Constant::String(b"hello world".to_vec()),
        Constant::String("héllo, wörld ✓".as_bytes().to_vec()),
        Constant::String((0..=255u8).collect()),
        Constant::Boolean(true),
        Constant::Boolean(false),
    ];
    for seed in 0..50 {
        let mut rng = ShroudRng::new(seed);
        let mut encryptor = all_on();
        for value in &values {
            let entry = encryptor.encrypt(value.clone(), &mut rng);
            let back = entry.decrypt();
            assert!(same(value, &back), "seed {}: {:?} came back as {:?}", seed, value, back);
        }
    }
}

#[test]
fn random_integers_round_trip() {
    let mut rng = ShroudRng::new(7);
    for _ in 0..2000 {
        let v = rng.range(0, 1 << 32) as i64 - (1 << 31);
        let entry = encrypt_integer(v, &mut rng);
        assert!(entry.is_encrypted());
        assert_eq!(entry.decrypt(), Constant::Integer(v));
    }
}

#[test]
fn string_chunks_are_bounded_and_cover_the_input() {
    let mut rng = ShroudRng::new(99);
    let text = b"the quick brown fox jumps over the lazy dog".to_vec();
    let chunks = encrypt_bytes(&text, &mut rng);
    assert!(chunks.iter().all(|c| (1..=8).contains(&c.bytes.len()) && c.key != 0));
    let mut indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
    indices.sort();
    assert_eq!(indices, (0..chunks.len()).collect::<Vec<_>>());
    assert_eq!(chunks.iter().map(|c| c.bytes.len()).sum::<usize>(), text.len());
    assert!(encrypt_bytes(b"", &mut rng).is_empty());
}

#[test]
fn disabled_kinds_stay_raw() {
    let mut rng = ShroudRng::new(1);
    let mut encryptor = ConstantEncryptor::new(EncryptionFlags { strings: true, numbers: false, booleans: false });
    assert_eq!(encryptor.encrypt(Constant::Integer(5), &mut rng), PoolEntry::Raw(Constant::Integer(5)));
    assert_eq!(encryptor.encrypt(Constant::Boolean(true), &mut rng), PoolEntry::Raw(Constant::Boolean(true)));
    assert!(encryptor.encrypt(Constant::String(b"x".to_vec()), &mut rng).is_encrypted());
    assert_eq!(encryptor.stats.strings_encrypted, 1);
    assert_eq!(encryptor.stats.numbers_encoded, 0);
}

#[test]
fn non_finite_floats_stay_raw() {
    let mut rng = ShroudRng::new(3);
    let entry = all_on().encrypt(Constant::Float(f64::NEG_INFINITY), &mut rng);
    assert!(!entry.is_encrypted());
}

#[test]
fn opcode_map_is_injective_in_every_configuration() {
    for seed in 0..64 {
        for (shuffle, polymorphism) in [(false, false), (true, false), (false, true), (true, true)] {
            let map = OpcodeMap::generate(&mut ShroudRng::new(seed), shuffle, polymorphism);
            assert!(map.is_injective(), "seed {} shuffle {} poly {}", seed, shuffle, polymorphism);
            let inverse = map.inverse();
            assert_eq!(inverse.len(), Opcode::COUNT);
            for op in Opcode::ALL {
                assert_eq!(map.decode(map.encode(op)), Some(op));
            }
        }
    }
}

#[test]
fn canonical_map_is_identity_plus_one() {
    let map = OpcodeMap::generate(&mut ShroudRng::new(5), false, false);
    assert_eq!(map, OpcodeMap::canonical());
    assert_eq!(map.key(), 0);
    for op in Opcode::ALL {
        assert_eq!(map.encode(op) as usize, op.index() + 1);
    }
}

#[test]
fn polymorphism_varies_maps_across_builds() {
    let maps: HashSet<Vec<u8>> = (0..16)
        .map(|seed| {
            let map = OpcodeMap::generate(&mut ShroudRng::new(seed), false, true);
            assert_ne!(map.key(), 0);
            Opcode::ALL.iter().map(|op| map.encode(*op)).collect()
        })
        .collect();
    assert!(maps.len() > 1);
}

#[test]
fn aliases_are_stable_and_distinct() {
    let mut rng = ShroudRng::new(11);
    let mut identifiers = IdentifierObfuscator::new(true);
    identifiers.reserve(["print"]);
    let names = ["alpha", "beta", "gamma", "delta", "alpha"];
    let aliases: Vec<String> = names.iter().map(|n| identifiers.alias(n, &mut rng)).collect();
    assert_eq!(aliases[0], aliases[4]);
    let distinct: HashSet<&String> = aliases[..4].iter().collect();
    assert_eq!(distinct.len(), 4);
    for alias in &aliases {
        assert!(!LUA_KEYWORDS.contains(&alias.as_str()));
        assert_ne!(alias, "print");
        assert_ne!(alias, "_ENV");
    }
    assert_eq!(identifiers.renamed(), 4);
}

#[test]
fn keywords_and_env_are_never_aliased() {
    let mut rng = ShroudRng::new(2);
    let mut identifiers = IdentifierObfuscator::new(true);
    assert_eq!(identifiers.alias("_ENV", &mut rng), "_ENV");
    assert_eq!(identifiers.alias("while", &mut rng), "while");
    assert_eq!(identifiers.renamed(), 0);
}

#[test]
fn disabled_renaming_keeps_names_readable() {
    let mut rng = ShroudRng::new(2);
    let mut identifiers = IdentifierObfuscator::new(false);
    let alias = identifiers.alias("counter", &mut rng);
    assert!(alias.contains("counter"), "{}", alias);
    assert_eq!(identifiers.renamed(), 0);
}
