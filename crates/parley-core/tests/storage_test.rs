//! Persistence tests for identity, contacts and the message queue.
//!
//! Each store is reopened from disk to check that what a restarted client
//! sees matches what the previous run wrote.

use std::{
    collections::BTreeMap,
    fs,
    time::{Duration, Instant},
};

use parley_core::{ContactBook, Environment, Identity, MessageQueue, TrustDecision};
use parley_crypto::StaticKeypair;
use parley_proto::Fingerprint;
use proptest::prelude::*;

#[derive(Clone)]
struct FixedEnv(u8);

impl Environment for FixedEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_time(&self) -> u64 {
        1_700_000_000
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(self.0);
    }
}

fn fp(c: char) -> Fingerprint {
    Fingerprint::parse(&c.to_string().repeat(16)).unwrap()
}

#[test]
fn identity_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = Identity::load_or_create(dir.path(), &FixedEnv(1)).unwrap();
    let second = Identity::load_or_create(dir.path(), &FixedEnv(2)).unwrap();

    assert_eq!(first.fingerprint(), second.fingerprint());
    assert_eq!(fs::read(dir.path().join("identity.key")).unwrap().len(), 32);
}

#[test]
fn corrupt_identity_is_moved_aside() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("identity.key"), b"short").unwrap();

    let identity = Identity::load_or_create(dir.path(), &FixedEnv(3)).unwrap();

    assert_eq!(fs::read(dir.path().join("identity.key.corrupt")).unwrap(), b"short");
    let expected = StaticKeypair::from_secret_bytes([3; 32]).fingerprint();
    assert_eq!(identity.fingerprint(), expected);
}

#[test]
fn identity_signatures_verify() {
    let identity = Identity::generate(&FixedEnv(4));
    let sig = identity.sign(b"announce").unwrap();
    assert!(StaticKeypair::verify(&identity.verifying_key().unwrap(), b"announce", &sig));
}

#[test]
fn tofu_pins_first_key() {
    let dir = tempfile::tempdir().unwrap();
    let bob = StaticKeypair::from_secret_bytes([5; 32]);
    let mallory = StaticKeypair::from_secret_bytes([6; 32]);
    let bob_fp = bob.fingerprint();

    {
        let mut book = ContactBook::open(dir.path());
        let first = book.verify_or_add(bob_fp, bob.public(), Some("bob"), 10);
        assert_eq!(first, TrustDecision::NewContact { name: "bob".into() });
        assert!(first.is_trusted());

        let again = book.verify_or_add(bob_fp, bob.public(), Some("robert"), 20);
        assert_eq!(again, TrustDecision::Verified { name: "bob".into() });
    }

    let mut book = ContactBook::open(dir.path());
    assert_eq!(book.len(), 1);
    assert_eq!(book.get(&bob_fp).unwrap().first_seen, 10);

    // Same fingerprint claimed with a different key.
    let mismatch = book.verify_or_add(bob_fp, mallory.public(), Some("bob"), 30);
    assert_eq!(mismatch, TrustDecision::KeyMismatch { fingerprint: bob_fp });
    assert!(!mismatch.is_trusted());
    assert!(mismatch.to_string().contains("mismatch"));
    assert_eq!(book.public_key(&bob_fp), Some(*bob.public()));
}

#[test]
fn tofu_is_idempotent_and_only_name_changes() {
    let mut book = ContactBook::in_memory();
    let carol = StaticKeypair::from_secret_bytes([7; 32]);
    let carol_fp = carol.fingerprint();

    for _ in 0..3 {
        assert!(book.verify_or_add(carol_fp, carol.public(), None, 1).is_trusted());
    }
    assert_eq!(book.len(), 1);
    assert_eq!(book.name_for(carol_fp), format!("Peer_{}", carol_fp.short()));

    assert!(book.rename(carol_fp, "carol"));
    assert_eq!(book.name_for(carol_fp), "carol");
    assert!(!book.rename(fp('a'), "nobody"));
}

#[test]
fn contacts_list_sorted_by_name() {
    let mut book = ContactBook::in_memory();
    for (seed, name) in [(8u8, "zoe"), (9, "adam"), (10, "mia")] {
        let key = StaticKeypair::from_secret_bytes([seed; 32]);
        book.verify_or_add(key.fingerprint(), key.public(), Some(name), 0);
    }
    let names: Vec<_> = book.list().into_iter().map(|(_, c)| c.name.clone()).collect();
    assert_eq!(names, ["adam", "mia", "zoe"]);
}

#[test]
fn corrupt_contacts_start_empty() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("contacts.json"), "[1, 2").unwrap();
    assert!(ContactBook::open(dir.path()).is_empty());
}

#[test]
fn queue_flushes_in_order_then_empty() {
    let dir = tempfile::tempdir().unwrap();
    let dest = fp('b');

    {
        let mut queue = MessageQueue::open(dir.path());
        for i in 0..5 {
            queue.enqueue(dest, &format!("msg {i}"), 0, BTreeMap::new(), 100 + i);
        }
        assert_eq!(queue.len(&dest), 5);
    }

    let mut queue = MessageQueue::open(dir.path());
    assert_eq!(queue.pending(), BTreeMap::from([(dest, 5)]));

    let texts: Vec<_> = queue.flush(dest).into_iter().map(|e| e.text).collect();
    assert_eq!(texts, ["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
    assert!(queue.flush(dest).is_empty());

    assert!(!dir.path().join("queue").join(format!("{dest}.json")).exists());
    assert!(MessageQueue::open(dir.path()).is_empty(&dest));
}

#[test]
fn requeue_goes_ahead_of_newer_messages() {
    let mut queue = MessageQueue::in_memory();
    let dest = fp('c');

    queue.enqueue(dest, "first", 0, BTreeMap::new(), 1);
    queue.enqueue(dest, "second", 0, BTreeMap::new(), 2);
    let flushed = queue.flush(dest);

    queue.enqueue(dest, "third", 0, BTreeMap::new(), 3);
    queue.requeue_front(dest, flushed);

    let texts: Vec<_> = queue.flush(dest).into_iter().map(|e| e.text).collect();
    assert_eq!(texts, ["first", "second", "third"]);
}

#[test]
fn queue_keeps_metadata_and_ignores_stray_files() {
    let dir = tempfile::tempdir().unwrap();
    let dest = fp('d');
    let metadata = BTreeMap::from([("origin".to_string(), "cli".to_string())]);

    MessageQueue::open(dir.path()).enqueue(dest, "hi", 3, metadata.clone(), 9);
    fs::write(dir.path().join("queue").join("notes.txt"), "x").unwrap();
    fs::write(dir.path().join("queue").join("not-a-fingerprint.json"), "[]").unwrap();

    let mut queue = MessageQueue::open(dir.path());
    assert_eq!(queue.pending().len(), 1);

    let entry = queue.flush(dest).remove(0);
    assert_eq!(entry.metadata, metadata);
    assert_eq!(entry.stream_id, 3);
    assert_eq!(entry.enqueued_at, 9);

    queue.enqueue(dest, "bye", 0, BTreeMap::new(), 10);
    queue.clear(dest);
    assert!(queue.is_empty(&dest));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn reopened_queue_preserves_order(texts in prop::collection::vec(".{0,64}", 1..16)) {
        let dir = tempfile::tempdir().unwrap();
        let dest = fp('e');
        {
            let mut queue = MessageQueue::open(dir.path());
            for (i, text) in texts.iter().enumerate() {
                queue.enqueue(dest, text, 0, BTreeMap::new(), i as u64);
            }
        }

        let flushed: Vec<_> = MessageQueue::open(dir.path()).flush(dest).into_iter().map(|e| e.text).collect();
        prop_assert_eq!(flushed, texts);
    }
}
