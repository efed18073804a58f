#![allow(missing_docs)]
#![cfg(not(feature = "loom"))]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use vine::{RunError, Runtime};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn recorder(log: &Log, name: &'static str) -> impl Fn() + Send + Sync + 'static {
    let log = Arc::clone(log);
    move || log.lock().unwrap().push(name)
}

#[test]
fn hello_world_runs_in_order() {
    let rt = Runtime::with_worker_threads(2);
    let log: Log = Arc::default();

    let stage = rt.add_stage("greet");
    let hello = rt.add_function(stage, &[], recorder(&log, "Hello"));
    {
        let log = Arc::clone(&log);
        let rt = rt.clone();
        rt.clone().add_function(stage, &[hello], move || {
            log.lock().unwrap().push("World!");
            rt.request_shutdown();
        });
    }

    let machine = rt.add_machine("main");
    rt.add_stage_node(machine, stage, &[]);
    rt.set_machine(machine);
    rt.run().unwrap();

    assert_eq!(*log.lock().unwrap(), ["Hello", "World!"]);
}

#[test]
fn diamond_releases_in_dependency_order() {
    let rt = Runtime::with_worker_threads(4);
    let log: Log = Arc::default();

    let stage = rt.add_stage("diamond");
    let top = rt.add_function(stage, &[], recorder(&log, "top"));
    let left = rt.add_function(stage, &[top], recorder(&log, "left"));
    let right = rt.add_function(stage, &[top], recorder(&log, "right"));
    {
        let log = Arc::clone(&log);
        let rt = rt.clone();
        rt.clone().add_function(stage, &[left, right], move || {
            log.lock().unwrap().push("bot");
            rt.request_shutdown();
        });
    }

    let machine = rt.add_machine("main");
    rt.add_stage_node(machine, stage, &[]);
    rt.set_machine(machine);
    rt.run().unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 4);
    assert_eq!(log[0], "top");
    assert_eq!(log[3], "bot");
    assert!(log[1..3].contains(&"left"));
    assert!(log[1..3].contains(&"right"));
}

#[test]
fn stage_dependencies_gate_every_function() {
    let rt = Runtime::with_worker_threads(4);
    let log: Log = Arc::default();

    let phys = rt.add_stage("phys");
    let logic = rt.add_stage("logic");
    let net = rt.add_stage("net");
    let sync_ln = rt.add_stage("sync_ln");
    let sync_lp = rt.add_stage("sync_lp");

    for (stage, name) in [(phys, "phys"), (logic, "logic"), (net, "net")] {
        rt.add_function(stage, &[], recorder(&log, name));
        rt.add_function(stage, &[], recorder(&log, name));
    }
    rt.add_function(sync_ln, &[], recorder(&log, "ln"));
    rt.add_function(sync_ln, &[], recorder(&log, "ln"));
    {
        let log = Arc::clone(&log);
        let rt = rt.clone();
        rt.clone().add_function(sync_lp, &[], move || {
            log.lock().unwrap().push("lp");
            rt.request_shutdown();
        });
    }

    let machine = rt.add_machine("frame");
    let n_phys = rt.add_stage_node(machine, phys, &[]);
    let n_logic = rt.add_stage_node(machine, logic, &[]);
    let n_net = rt.add_stage_node(machine, net, &[]);
    rt.add_stage_node(machine, sync_ln, &[n_logic, n_net]);
    rt.add_stage_node(machine, sync_lp, &[n_logic, n_phys]);
    rt.set_machine(machine);
    rt.run().unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 9);
    let last = |name| log.iter().rposition(|entry| *entry == name).unwrap();
    let first = |name| log.iter().position(|entry| *entry == name).unwrap();
    // A stage node's functions start only after every function of each
    // dependency stage has completed.
    assert!(last("logic") < first("ln"));
    assert!(last("net") < first("ln"));
    assert!(last("logic") < first("lp"));
    assert!(last("phys") < first("lp"));
}

#[test]
fn independent_functions_each_run_every_execution() {
    const RUNS: usize = 100;

    let rt = Runtime::with_worker_threads(3);
    let buffer: Log = Arc::default();
    let executions: Arc<Mutex<Vec<Vec<&'static str>>>> = Arc::default();

    let work = rt.add_stage("work");
    for name in ["a", "b", "c"] {
        rt.add_function(work, &[], recorder(&buffer, name));
    }

    // Runs after the whole `work` stage drained; snapshots the buffer into
    // the per-execution list.
    let collect = rt.add_stage("collect");
    {
        let buffer = Arc::clone(&buffer);
        let executions = Arc::clone(&executions);
        let rt = rt.clone();
        rt.clone().add_function(collect, &[], move || {
            let mut executions = executions.lock().unwrap();
            executions.push(std::mem::take(&mut *buffer.lock().unwrap()));
            if executions.len() == RUNS {
                rt.request_shutdown();
            }
        });
    }

    let machine = rt.add_machine("main");
    let n_work = rt.add_stage_node(machine, work, &[]);
    rt.add_stage_node(machine, collect, &[n_work]);
    rt.set_machine(machine);
    rt.run().unwrap();

    let executions = executions.lock().unwrap();
    assert_eq!(executions.len(), RUNS);
    for execution in executions.iter() {
        let mut sorted = execution.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, ["a", "b", "c"]);
    }
}

#[test]
fn machine_reruns_until_shutdown() {
    let rt = Runtime::with_worker_threads(2);
    let count = Arc::new(AtomicUsize::new(0));

    let stage = rt.add_stage("tick");
    {
        let count = Arc::clone(&count);
        let rt = rt.clone();
        rt.clone().add_function(stage, &[], move || {
            if count.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
                rt.request_shutdown();
            }
        });
    }

    let machine = rt.add_machine("loop");
    rt.add_stage_node(machine, stage, &[]);
    rt.set_machine(machine);
    rt.run().unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 5);
}

#[test]
fn machine_swap_applies_between_executions() {
    let rt = Runtime::with_worker_threads(2);
    let m1_runs = Arc::new(AtomicUsize::new(0));
    let m2_runs = Arc::new(AtomicUsize::new(0));

    let m1 = rt.add_machine("m1");
    let m2 = rt.add_machine("m2");

    let s1 = rt.add_stage("s1");
    {
        let m1_runs = Arc::clone(&m1_runs);
        let rt = rt.clone();
        rt.clone().add_function(s1, &[], move || {
            m1_runs.fetch_add(1, Ordering::SeqCst);
            rt.set_machine(m2);
        });
    }

    let s2 = rt.add_stage("s2");
    {
        let m2_runs = Arc::clone(&m2_runs);
        let rt = rt.clone();
        rt.clone().add_function(s2, &[], move || {
            m2_runs.fetch_add(1, Ordering::SeqCst);
            rt.request_shutdown();
        });
    }

    rt.add_stage_node(m1, s1, &[]);
    rt.add_stage_node(m2, s2, &[]);
    rt.set_machine(m1);
    rt.run().unwrap();

    assert_eq!(m1_runs.load(Ordering::SeqCst), 1);
    assert_eq!(m2_runs.load(Ordering::SeqCst), 1);
}

#[test]
fn shutdown_before_run_executes_nothing() {
    let rt = Runtime::with_worker_threads(2);
    let count = Arc::new(AtomicUsize::new(0));

    let stage = rt.add_stage("never");
    {
        let count = Arc::clone(&count);
        rt.add_function(stage, &[], move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
    }
    let machine = rt.add_machine("main");
    rt.add_stage_node(machine, stage, &[]);
    rt.set_machine(machine);

    rt.request_shutdown();
    rt.run().unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn run_without_machine_fails() {
    let rt = Runtime::with_worker_threads(1);
    assert_eq!(rt.run(), Err(RunError::NoMachine));
}

#[test]
fn empty_stage_is_rejected() {
    let rt = Runtime::with_worker_threads(1);
    let stage = rt.add_stage("hollow");
    let machine = rt.add_machine("main");
    rt.add_stage_node(machine, stage, &[]);
    rt.set_machine(machine);

    assert!(matches!(rt.run(), Err(RunError::EmptyStage { .. })));
}

#[test]
fn second_run_fails() {
    let rt = Runtime::with_worker_threads(1);
    let stage = rt.add_stage("once");
    {
        let rt = rt.clone();
        rt.clone()
            .add_function(stage, &[], move || rt.request_shutdown());
    }
    let machine = rt.add_machine("main");
    rt.add_stage_node(machine, stage, &[]);
    rt.set_machine(machine);

    rt.run().unwrap();
    assert_eq!(rt.run(), Err(RunError::AlreadyRunning));
}

#[test]
#[should_panic(expected = "frozen")]
fn registration_after_run_panics() {
    let rt = Runtime::with_worker_threads(1);
    let stage = rt.add_stage("once");
    {
        let rt = rt.clone();
        rt.clone()
            .add_function(stage, &[], move || rt.request_shutdown());
    }
    let machine = rt.add_machine("main");
    rt.add_stage_node(machine, stage, &[]);
    rt.set_machine(machine);
    rt.run().unwrap();

    let _ = rt.add_stage("late");
}

#[test]
#[should_panic(expected = "same stage")]
fn cross_stage_dependency_panics() {
    let rt = Runtime::with_worker_threads(1);
    let first = rt.add_stage("first");
    let second = rt.add_stage("second");
    let func = rt.add_function(first, &[], || {});

    let _ = rt.add_function(second, &[func], || {});
}
