//! Property-based tests for the scheduler invariants.

use super::helpers::SimpleRng;
use crate::config::{SchedConfig, NLEVELS, NPROC, NSTRIDE, RESERVED_PIDS};
use crate::sched::{HybridScheduler, Mlfq, Scheduler, StrideTable, Winner};
use crate::thread::{Pid, ProcState};

use alloc::vec;
use alloc::vec::Vec;

fn pid(n: usize) -> Pid {
    Pid::new(n).unwrap()
}

fn random_unit(rng: &mut SimpleRng, limit: usize) -> Pid {
    pid(rng.gen_range(RESERVED_PIDS as u64 + 1, limit as u64) as usize)
}

#[test]
fn test_reserved_total_never_exceeds_ceiling() {
    let mut rng = SimpleRng::new(0x5eed);
    let mut table = StrideTable::default();

    for _ in 0..2000 {
        let unit = random_unit(&mut rng, NSTRIDE);
        if rng.gen_range(0, 4) == 0 {
            let before = table.reserved_total();
            let released = table.release(unit);
            assert_eq!(table.reserved_total(), before - released.unwrap_or(0));
            continue;
        }

        let share = rng.gen_range(1, 60) as u32;
        let before = table.reserved_total();
        let previous = table.share_of(unit);
        match table.reserve(unit, share) {
            Ok(granted) => {
                assert_eq!(granted, share);
                assert_eq!(table.share_of(unit), Some(share));
            }
            Err(_) => {
                assert_eq!(table.reserved_total(), before);
                assert_eq!(table.share_of(unit), previous);
            }
        }
        assert!(table.reserved_total() <= 80);
        assert_eq!(table.pool_share(), 100 - table.reserved_total());
    }
}

#[test]
fn test_stride_picks_follow_shares() {
    let mut rng = SimpleRng::new(42);
    for _ in 0..20 {
        let mut table = StrideTable::default();
        let mut shares = Vec::new();
        let mut next = RESERVED_PIDS + 1;
        while table.reserved_total() < 60 {
            let share = rng.gen_range(5, 25) as u32;
            if table.reserve(pid(next), share).is_ok() {
                shares.push((pid(next), share));
                next += 1;
            } else {
                break;
            }
        }

        let states = vec![ProcState::Runnable; NSTRIDE];
        let picks = 10_000;
        let mut wins = vec![0u32; NSTRIDE + 1];
        for _ in 0..picks {
            match table.pick(&states[..]) {
                Winner::Pool => wins[0] += 1,
                Winner::Unit(unit) => wins[unit.get()] += 1,
            }
        }

        let check = |won: u32, share: u32| {
            let expected = picks as f64 * f64::from(share) / 100.0;
            let error = (f64::from(won) - expected).abs() / expected;
            assert!(error < 0.05, "share {} won {} of {}", share, won, picks);
        };
        check(wins[0], table.pool_share());
        for (unit, share) in shares {
            check(wins[unit.get()], share);
        }
    }
}

#[test]
fn test_demotion_is_gradual_and_bounded() {
    let mut rng = SimpleRng::new(7);
    let mut sched = HybridScheduler::new(SchedConfig::default().with_boost_interval(0));
    let states = vec![ProcState::Runnable; NPROC];
    for n in RESERVED_PIDS + 1..=RESERVED_PIDS + 8 {
        sched.admit(pid(n));
    }

    for _ in 0..3000 {
        let Some(chosen) = sched.next_runnable(&states[..]) else {
            panic!("pool has runnable members");
        };
        let before = sched.mlfq().level_of(chosen).unwrap();
        let ran = rng.gen_range(0, 4);
        sched.on_return(chosen, ProcState::Runnable, ran);

        let after = sched.mlfq().level_of(chosen).unwrap();
        assert!(after == before || after == before + 1);
        assert!(after < NLEVELS);
        sched.mlfq().assert_consistent();
    }
}

#[test]
fn test_boost_lifts_everyone() {
    let config = SchedConfig::default().with_boost_interval(50);
    let mut sched = HybridScheduler::new(config);
    let states = vec![ProcState::Runnable; NPROC];
    for n in RESERVED_PIDS + 1..=RESERVED_PIDS + 4 {
        sched.admit(pid(n));
    }

    for _ in 0..49 {
        if let Some(chosen) = sched.next_runnable(&states[..]) {
            sched.on_return(chosen, ProcState::Runnable, 4);
        }
    }
    assert!(sched.mlfq().len(0) < 4);

    // The 50th selection boosts before it picks.
    let chosen = sched.next_runnable(&states[..]).unwrap();
    assert_eq!(sched.mlfq().level_of(chosen), Some(0));
    assert_eq!(sched.mlfq().len(0), 4);
}

#[test]
fn test_mlfq_lists_survive_random_operations() {
    let mut rng = SimpleRng::new(0xdead_beef);
    let mut mlfq = Mlfq::new(&SchedConfig::default());
    let mut states = vec![ProcState::Runnable; NPROC];

    for _ in 0..5000 {
        let unit = random_unit(&mut rng, NPROC);
        match rng.gen_range(0, 7) {
            0 | 1 => mlfq.admit(unit),
            2 => mlfq.remove(unit),
            3 => {
                mlfq.charge(unit, rng.gen_range(0, 8));
                if mlfq.budget_exhausted(unit) {
                    mlfq.demote(unit);
                }
            }
            4 => {
                states[unit.slot()] = if rng.gen_bool() {
                    ProcState::Runnable
                } else {
                    ProcState::Sleeping
                };
            }
            5 => mlfq.boost(),
            _ => {
                if let Some(chosen) = mlfq.next_runnable(&states[..]) {
                    assert_eq!(states[chosen.slot()], ProcState::Runnable);
                    assert!(mlfq.contains(chosen));
                }
            }
        }
        mlfq.assert_consistent();
        let total: usize = (0..NLEVELS).map(|level| mlfq.len(level)).sum();
        assert_eq!(total, mlfq.total());
    }
}
