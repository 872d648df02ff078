//! Index commits and their kv side effects when the store rejects writes

mod common;

use ::common::prelude::*;
use ::common::protocol::keys;

fn org_record_recipients(store: &MemoryStore, org_id: &uuid::Uuid) -> Vec<uuid::Uuid> {
    let bytes = store.get(org_id, keys::ENTITY).unwrap().unwrap();
    decode(&bytes).unwrap().recipient_ids()
}

#[test]
fn test_failed_commit_leaves_index_untouched() {
    let common::FailingOrg {
        store,
        kv,
        admin,
        mut org,
    } = common::setup_failing_org();
    let before = org.index().clone();

    kv.fail_puts(org.id(), keys::INDEX);
    assert!(matches!(
        org.add_pairing_key("p1", "s1", ["web"]),
        Err(ProtocolError::Store(_))
    ));
    assert_eq!(org.index(), &before);

    let reloaded = Context::load_organization(&admin, org.id(), store.clone(), store.clone()).unwrap();
    assert_eq!(reloaded.index(), &before);

    kv.heal();
    org.add_pairing_key("p1", "s1", ["web"]).unwrap();
    assert!(org.index().pairing_key("p1").is_ok());
}

#[test]
fn test_registration_is_requeued_when_commit_fails() {
    let common::FailingOrg {
        store,
        kv,
        admin,
        mut org,
    } = common::setup_failing_org();
    org.add_pairing_key("p1", "s1", ["web"]).unwrap();
    org.create_ca("web-ca", ["web"]).unwrap();

    let node = common::new_node(&store, "n1", 1);
    node.register_node(org.id(), "p1", "s1").unwrap();
    let before = org.index().clone();

    kv.fail_puts(org.id(), keys::INDEX);
    let err = org.accept_registration(&X509Authority).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Requeued(ref inner) if matches!(**inner, ProtocolError::Store(_))
    ));
    assert_eq!(org.index(), &before);
    assert!(org.index().pairing_key("p1").is_ok());
    assert_eq!(
        common::depth(&store, org.id(), Direction::Incoming, Channel::Registration),
        1
    );
    assert_eq!(
        common::depth(&store, node.id(), Direction::Incoming, Channel::Certs),
        0
    );
    let persisted = Context::load_organization(&admin, org.id(), store.clone(), store.clone()).unwrap();
    assert!(persisted.index().list(ObjectKind::Node).is_empty());

    kv.heal();
    let report = org.register_nodes(&X509Authority).unwrap();
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.accepted[0].issuance.issued.len(), 1);
    assert!(org.index().pairing_key("p1").is_err());
}

#[test]
fn test_failed_invite_commit_keeps_organization_sealed() {
    let common::FailingOrg {
        store,
        kv,
        admin: alice,
        mut org,
    } = common::setup_failing_org();
    org.add_invite_key("i1", "k1").unwrap();

    let bob = Entity::generate("bob").unwrap();
    request_invite(&bob, org.id(), "i1", "k1", &store).unwrap();
    let before = org.index().clone();

    kv.fail_puts(org.id(), keys::INDEX);
    let err = org.accept_invite().unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Requeued(ref inner) if matches!(**inner, ProtocolError::Store(_))
    ));
    assert_eq!(org.index(), &before);
    assert_eq!(
        common::depth(&store, org.id(), Direction::Incoming, Channel::Invite),
        1
    );

    // no recipient slot for bob, and nothing delivered to him
    assert_eq!(org_record_recipients(&store, org.id()).len(), 2);
    assert!(!org_record_recipients(&store, org.id()).contains(bob.id()));
    assert!(Context::load_organization(&bob, org.id(), store.clone(), store.clone()).is_err());
    assert_eq!(
        common::depth(&store, bob.id(), Direction::Incoming, Channel::Invite),
        0
    );

    kv.heal();
    let report = org.process_invites().unwrap();
    assert_eq!(report.accepted.len(), 1);
    assert!(report.accepted[0].welcome_error.is_none());
    assert!(org_record_recipients(&store, org.id()).contains(bob.id()));

    let as_bob = complete_invite(&bob, store.clone(), store.clone()).unwrap();
    let as_alice = Context::load_organization(&alice, org.id(), store.clone(), store.clone()).unwrap();
    assert_eq!(as_bob.entity(), as_alice.entity());
}

#[test]
fn test_failed_welcome_is_reported_and_resent() {
    let common::FailingOrg {
        store,
        kv,
        mut org,
        ..
    } = common::setup_failing_org();
    org.add_invite_key("i1", "k1").unwrap();

    let bob = Entity::generate("bob").unwrap();
    request_invite(&bob, org.id(), "i1", "k1", &store).unwrap();

    kv.fail_puts(org.id(), keys::ENTITY);
    let invited = org.accept_invite().unwrap();
    assert!(matches!(invited.welcome_error, Some(ProtocolError::Store(_))));
    assert!(org.index().contains(ObjectKind::Admin, "bob"));
    assert!(org.index().invite_key("i1").is_err());

    // admitted, but still unable to open the organization
    assert!(!org_record_recipients(&store, org.id()).contains(bob.id()));
    assert!(matches!(
        complete_invite(&bob, store.clone(), store.clone()),
        Err(ProtocolError::EmptyQueue(_))
    ));

    kv.heal();
    let resent = org.resend_invite("bob").unwrap();
    assert_eq!(resent.id(), bob.id());
    let as_bob = complete_invite(&bob, store.clone(), store.clone()).unwrap();
    assert_eq!(as_bob.entity(), org.entity());
    assert_eq!(as_bob.load_admins().unwrap().len(), 2);
}

#[test]
fn test_resend_invite_to_unknown_admin_fails() {
    let common::FailingOrg { org, .. } = common::setup_failing_org();
    assert!(matches!(
        org.resend_invite("nobody"),
        Err(ProtocolError::Index(_))
    ));
}
