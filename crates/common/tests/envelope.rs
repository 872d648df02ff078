//! Integration tests for envelopes produced by entity operations

use ::common::entity::{authenticate, EntityError};
use ::common::envelope::{Blob, Body};
use ::common::prelude::*;
use serde_json::json;

fn entities(n: usize) -> Vec<Entity> {
    (0..n)
        .map(|i| Entity::generate(format!("e{}", i)).unwrap())
        .collect()
}

#[test]
fn test_codec_roundtrip_for_every_mode() {
    let [a, b]: [Entity; 2] = entities(2).try_into().unwrap();
    let envelopes = vec![
        a.sign(kinds::PUBLIC_ENTITY, &a.public()).unwrap(),
        a.encrypt(kinds::ENTITY, b"draft", &[]).unwrap(),
        a.encrypt_then_sign(kinds::ENTITY, b"x", Some(&[b.public()]))
            .unwrap(),
        a.encrypt_then_authenticate(kinds::REGISTRATION, b"y", &[b.public()], "p1", "s1")
            .unwrap(),
    ];
    for envelope in envelopes {
        let bytes = encode(&envelope).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(encode(&decoded).unwrap(), bytes);
    }
}

#[test]
fn test_every_byte_of_signed_envelope_is_covered() {
    let signer = Entity::generate("signer").unwrap();
    let envelope = signer
        .sign(kinds::CSR, &json!({"name": "csr-1", "node": "n1"}))
        .unwrap();
    let bytes = encode(&envelope).unwrap();

    // flip one character at a time; anything that still decodes must fail
    // verification unless it only touched the signature encoding
    let text = String::from_utf8(bytes).unwrap();
    let mut checked = 0;
    for (i, c) in text.char_indices() {
        let replacement = if c == 'a' { 'b' } else { 'a' };
        let mut tampered = text.clone();
        tampered.replace_range(i..i + c.len_utf8(), &replacement.to_string());
        let Ok(decoded) = decode(tampered.as_bytes()) else {
            continue;
        };
        if decoded == envelope {
            continue;
        }
        checked += 1;
        assert!(
            signer.verify(&decoded, None).is_err(),
            "tampering at {} went unnoticed",
            i
        );
    }
    assert!(checked > 0);
}

#[test]
fn test_recipient_sets() {
    let people = entities(5);
    let (sender, rest) = people.split_first().unwrap();
    let (inside, outside) = rest.split_at(2);
    let recipients: Vec<Entity> = inside.iter().map(Entity::public).collect();

    let envelope = sender
        .encrypt_then_sign(kinds::ENTITY, b"shared state", Some(&recipients))
        .unwrap();
    let envelope = decode(&encode(&envelope).unwrap()).unwrap();

    for member in inside {
        assert_eq!(
            member
                .verify_then_decrypt(&envelope, Some(&sender.public()))
                .unwrap(),
            b"shared state"
        );
    }
    for stranger in outside {
        assert!(matches!(
            stranger.verify_then_decrypt(&envelope, Some(&sender.public())),
            Err(EntityError::NotARecipient(_))
        ));
    }
}

#[test]
fn test_swapped_recipient_slot_fails_decrypt() {
    let [a, b, c]: [Entity; 3] = entities(3).try_into().unwrap();
    let mut envelope = a
        .encrypt(kinds::ENTITY, b"payload", &[b.public(), c.public()])
        .unwrap();
    let slot_b = envelope.options.recipients[&b.id().to_string()].clone();
    let slot_c = envelope.options.recipients[&c.id().to_string()].clone();
    envelope
        .options
        .recipients
        .insert(b.id().to_string(), slot_c);
    envelope
        .options
        .recipients
        .insert(c.id().to_string(), slot_b);

    assert!(matches!(
        b.decrypt(&envelope),
        Err(EntityError::DecryptionFailed(_))
    ));
}

#[test]
fn test_authenticated_secret_holder_without_keys() {
    let node = Entity::generate("n1").unwrap();
    let org = Entity::generate("org").unwrap();
    let envelope = node
        .encrypt_then_authenticate(kinds::REGISTRATION, b"hello", &[], "p1", "s1")
        .unwrap();

    authenticate(&envelope, "s1").unwrap();
    assert!(matches!(
        authenticate(&envelope, "s2"),
        Err(EntityError::AuthenticationFailed)
    ));
    assert_eq!(
        org.verify_authentication_then_decrypt(&envelope, "s1")
            .unwrap(),
        b"hello"
    );

    // swapping the body for another ciphertext breaks the MAC
    let mut swapped = envelope.clone();
    swapped.body = Body::Sealed(Blob(vec![0u8; 64]));
    assert!(matches!(
        org.verify_authentication_then_decrypt(&swapped, "s1"),
        Err(EntityError::AuthenticationFailed)
    ));
}
