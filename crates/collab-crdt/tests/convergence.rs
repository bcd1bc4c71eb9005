//! End-to-end convergence scenarios driven through a live `Runtime` on two
//! or three simulated replicas, exchanging encoded transactions directly
//! rather than through any transport.

use collab_causal::MetadataRequest;
use collab_core::{MessageMeta, ReplicaId};
use collab_crdt::{AddWinsSet, GCounter, LwwRegister, OptionalOp, OptionalRegister, SetOp, ValueMap};
use collab_runtime::{PrimitiveCollab, Runtime};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;

fn replica(seed: u64) -> ReplicaId {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    ReplicaId::generate_from(&mut rng)
}

fn sync(from: &mut Runtime, to: &mut Runtime) {
    for txn in from.drain_outbound() {
        to.receive_wire_transaction(&txn).unwrap();
    }
}

#[test]
fn counter_converges_regardless_of_delivery_order() {
    let mut a = Runtime::new(replica(1));
    let handle_a = a.register("count", GCounter::new()).unwrap();
    a.go_live();

    let mut b = Runtime::new(replica(2));
    let handle_b = b.register("count", GCounter::new()).unwrap();
    b.go_live();

    a.apply(&handle_a, 3).unwrap();
    a.apply(&handle_a, 4).unwrap();
    b.apply(&handle_b, 10).unwrap();

    // Deliver b's transactions to a before a's own go to b.
    sync(&mut b, &mut a);
    sync(&mut a, &mut b);

    assert_eq!(a.get(&handle_a).unwrap().value(), 17);
    assert_eq!(b.get(&handle_b).unwrap().value(), 17);
}

#[test]
fn value_map_resolves_concurrent_writes_by_lex_max_sender() {
    let r1 = replica(1);
    let r2 = replica(2);
    let (low, high) = if r1 < r2 { (r1, r2) } else { (r2, r1) };

    let mut a = Runtime::new(low);
    let handle_a = a.register("m", ValueMap::<String, i32>::new()).unwrap();
    a.go_live();

    let mut b = Runtime::new(high);
    let handle_b = b.register("m", ValueMap::<String, i32>::new()).unwrap();
    b.go_live();

    // Concurrent writes to the same key on both replicas, neither having
    // seen the other yet.
    a.transact(|txn| collab_crdt::set_value(txn, &handle_a, &"k".to_string(), 1)).unwrap();
    b.transact(|txn| collab_crdt::set_value(txn, &handle_b, &"k".to_string(), 2)).unwrap();

    sync(&mut a, &mut b);
    sync(&mut b, &mut a);

    assert_eq!(*collab_crdt::get(&a, &handle_a, &"k".to_string()).unwrap(), 2);
    assert_eq!(*collab_crdt::get(&b, &handle_b, &"k".to_string()).unwrap(), 2);
}

#[test]
fn add_wins_set_survives_a_delete_racing_a_concurrent_add() {
    let mut a = Runtime::new(replica(1));
    let handle_a = a.register("s", AddWinsSet::<String>::new()).unwrap();
    a.go_live();

    let mut b = Runtime::new(replica(2));
    let handle_b = b.register("s", AddWinsSet::<String>::new()).unwrap();
    b.go_live();

    a.apply(&handle_a, SetOp::Add("x".to_string())).unwrap();
    sync(&mut a, &mut b);
    assert!(b.get(&handle_b).unwrap().contains(&"x".to_string()));

    // b deletes what it has seen, concurrently with a re-adding.
    b.apply(&handle_b, SetOp::Delete("x".to_string())).unwrap();
    a.apply(&handle_a, SetOp::Add("x".to_string())).unwrap();

    sync(&mut b, &mut a);
    sync(&mut a, &mut b);

    assert!(a.get(&handle_a).unwrap().contains(&"x".to_string()), "the concurrent add must win on a");
    assert!(b.get(&handle_b).unwrap().contains(&"x".to_string()), "the concurrent add must win on b");
}

#[test]
fn lww_register_tie_breaks_equal_lamport_by_sender() {
    let r1 = replica(1);
    let r2 = replica(2);
    let (low, high) = if r1 < r2 { (r1, r2) } else { (r2, r1) };

    let mut a = Runtime::new(low);
    let handle_a = a.register("r", LwwRegister::<i32>::new()).unwrap();
    a.go_live();

    let mut b = Runtime::new(high);
    let handle_b = b.register("r", LwwRegister::<i32>::new()).unwrap();
    b.go_live();

    a.apply(&handle_a, 100).unwrap();
    b.apply(&handle_b, 200).unwrap();

    sync(&mut a, &mut b);
    sync(&mut b, &mut a);

    // Both replicas' writes are first local transactions, so both carry
    // lamport 1; the higher sender (`high`, b's write) wins the tie.
    assert_eq!(*a.get(&handle_a).unwrap().value().unwrap(), 200);
    assert_eq!(*b.get(&handle_b).unwrap().value().unwrap(), 200);
}

#[test]
fn a_transaction_withheld_until_its_causal_dependency_arrives_is_buffered_then_replayed() {
    let mut a = Runtime::new(replica(1));
    let handle_a = a.register("r", OptionalRegister::<i32>::new()).unwrap();
    a.go_live();
    a.apply(&handle_a, OptionalOp::Set(1)).unwrap();
    let first = a.drain_outbound().pop().unwrap();
    a.apply(&handle_a, OptionalOp::Set(2)).unwrap();
    let second = a.drain_outbound().pop().unwrap();

    let mut b = Runtime::new(replica(2));
    let handle_b = b.register("r", OptionalRegister::<i32>::new()).unwrap();
    b.go_live();

    // Deliver out of causal order: the second transaction depends on the
    // first via a's vector clock, so it must sit pending until `first`
    // arrives.
    b.receive_wire_transaction(&second).unwrap();
    assert_eq!(b.pending_message_count(), 1);
    assert!(b.get(&handle_b).unwrap().conflicts().is_empty());

    b.receive_wire_transaction(&first).unwrap();
    assert_eq!(b.pending_message_count(), 0);
    assert_eq!(b.get(&handle_b).unwrap().conflicts(), vec![&2]);
}

#[test]
fn run_locally_replays_metadata_without_touching_the_outbound_queue() {
    let mut rt = Runtime::new(replica(1));
    let handle = rt.register("r", LwwRegister::<i32>::new()).unwrap();
    rt.go_live();

    let meta = MessageMeta {
        sender: Some(replica(9)),
        sender_counter: 1,
        lamport: Some(5),
        wall_clock: None,
        vc_entries: Default::default(),
    };
    let (payload, _request): (Vec<u8>, MetadataRequest) = rt.get(&handle).unwrap().encode_op(&7);
    rt.run_locally(meta, |ctx| ctx.deliver(handle.path(), &payload)).unwrap().unwrap();

    assert_eq!(*rt.get(&handle).unwrap().value().unwrap(), 7);
    assert!(rt.drain_outbound().is_empty());
}
