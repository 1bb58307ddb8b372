use ringnet_core::{
    Directory, MessageType, OpenPolicy, Ring, RingConfig, Routing, Timestamp, VertexId,
    assemble_ring, assemble_ring_with, validate_and_route,
};
use std::collections::{BTreeSet, HashSet};

fn pairings(ring: &Ring) -> BTreeSet<((usize, usize), (usize, usize))> {
    ring.instructions()
        .iter()
        .map(|ins| {
            (
                (ins.sender_slot.domain, ins.sender_slot.user),
                (ins.receiver_slot.domain, ins.receiver_slot.user),
            )
        })
        .collect()
}

#[test]
fn one_instruction_per_user() {
    let shapes: [&[usize]; 4] = [&[1, 1], &[3, 1, 4], &[2, 7, 1, 8, 2], &[5; 6]];
    for counts in shapes {
        let ring = assemble_ring(counts.len(), |i| counts[i]).unwrap();
        let total: usize = counts.iter().sum();

        assert_eq!(ring.user_count(), total);
        assert_eq!(ring.instructions().len(), total);

        let keys: HashSet<_> = ring
            .instructions()
            .iter()
            .map(|ins| (ins.sender_domain.clone(), ins.sender_user.clone()))
            .collect();
        assert_eq!(keys.len(), total);

        for domain in ring.domains() {
            for user in domain.population.users() {
                assert!(ring.instructions().get(domain.id(), &user.id).is_some());
            }
        }
    }
}

fn assert_receivers_opposite(ring: &Ring, counts: &[usize]) {
    let nd = counts.len();
    for ins in ring.instructions().iter() {
        let i = ins.sender_slot.domain;
        let j = ins.sender_slot.user;
        let k = (i + nd / 2) % nd;
        assert_eq!(ins.receiver_slot.domain, k);
        assert_eq!(ins.receiver_slot.user, (i + j) % counts[k]);

        assert_eq!(&ins.sender_domain, ring.domains()[i].id());
        let opposite = &ring.domains()[k];
        assert_eq!(&ins.receiver_domain, opposite.id());
        assert!(opposite.population.contains(&ins.receiver_user));
        assert_eq!(ring.home_of(&ins.receiver_user), Some(k));
    }
}

#[test]
fn every_receiver_lives_in_the_opposite_domain() {
    let counts = [3, 1, 4, 1, 5, 9, 2];
    let ring = assemble_ring(counts.len(), |i| counts[i]).unwrap();
    assert_receivers_opposite(&ring, &counts);
}

#[test]
fn shuffled_rings_keep_receivers_opposite() {
    let counts = vec![3, 1, 4, 1, 5, 9, 2];
    let mut reordered = false;
    for seed in 0..8 {
        let config = RingConfig::new(counts.clone()).with_shuffle_seed(seed);
        let ring = assemble_ring_with(&config).unwrap();
        assert_receivers_opposite(&ring, &counts);

        reordered |= ring
            .domains()
            .iter()
            .enumerate()
            .any(|(i, d)| d.id() != &VertexId::new(format!("d{i}")));
    }
    assert!(reordered);
}

#[test]
fn four_single_user_domains_pair_across_the_ring() {
    let ring = assemble_ring(4, |_| 1).unwrap();
    let expected: BTreeSet<_> = [(0, 2), (1, 3), (2, 0), (3, 1)]
        .into_iter()
        .map(|(a, b)| ((a, 0), (b, 0)))
        .collect();
    assert_eq!(pairings(&ring), expected);
}

#[test]
fn odd_ring_collides_on_a_single_user() {
    let counts = [2, 1, 1, 1, 1];
    let ring = assemble_ring(5, |i| counts[i]).unwrap();

    let from_domain_zero: Vec<_> = pairings(&ring)
        .into_iter()
        .filter(|((d, _), _)| *d == 0)
        .map(|(_, receiver)| receiver)
        .collect();
    assert_eq!(from_domain_zero, vec![(2, 0), (2, 0)]);

    let target = VertexId::new("d2u0");
    let hits = ring
        .instructions()
        .iter()
        .filter(|ins| ins.receiver_user == target)
        .count();
    assert_eq!(hits, 2);
}

#[test]
fn every_instruction_routes_through_the_ring() {
    let ring = assemble_ring(5, |i| i + 1).unwrap();
    for (seq, ins) in ring.instructions().ordered().into_iter().enumerate() {
        let msg = ins.to_message(ins.message_id(0), Timestamp::from_millis(seq as u64));
        assert!(ring.knows(&msg.sender_id));
        let home = &ring.domains()[ins.sender_slot.domain].population;
        match validate_and_route(&msg, home, &ring, &OpenPolicy) {
            Routing::Deliver { transit, ack } => {
                assert_eq!(transit.kind, MessageType::Transit);
                assert_eq!(ack.kind, MessageType::Ar);
                assert_eq!(transit.receiver_id, ins.receiver_user);
            }
            Routing::Reject(reply) => panic!("unexpected rejection: {reply}"),
        }
    }
}

#[test]
fn foreign_sender_is_refused_by_another_domain() {
    let ring = assemble_ring(4, |_| 1).unwrap();
    let ins = ring
        .instructions()
        .get(&VertexId::new("d3"), &VertexId::new("d3u0"))
        .unwrap();
    let msg = ins.to_message(ins.message_id(0), Timestamp::from_millis(1));

    let d0 = &ring.domains()[0].population;
    let Routing::Reject(reply) = validate_and_route(&msg, d0, &ring, &OpenPolicy) else {
        panic!("d3u0 was routed by d0");
    };
    assert_eq!(reply.kind, MessageType::ErrorSender);

    let d3 = &ring.domains()[3].population;
    assert!(validate_and_route(&msg, d3, &ring, &OpenPolicy).is_delivered());
}

#[test]
fn attach_each_user_once() {
    let mut ring = assemble_ring(3, |_| 2).unwrap();
    let ids: Vec<VertexId> = ring.domains()[1]
        .population
        .users()
        .map(|u| u.id.clone())
        .collect();

    let population = &mut ring.domain_mut(1).unwrap().population;
    for id in &ids {
        population.attach(id).unwrap();
    }
    assert_eq!(population.connected_count(), 2);
    assert_eq!(population.pending_count(), 0);
    for id in &ids {
        assert!(population.attach(id).is_err());
    }
    assert_eq!(population.connected_count(), 2);
}
