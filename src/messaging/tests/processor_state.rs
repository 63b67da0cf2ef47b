//! Tests for the per-destination delivery gate

#[cfg(test)]
mod tests {
    use crate::messaging::api::{Identifier, ProcessorState, ProcessorStateManager};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_schedule_run_finish_cycle() {
        let manager = ProcessorStateManager::new();
        let queue = Identifier::from("orders");

        assert_eq!(manager.state(&queue).unwrap(), ProcessorState::Idle);
        assert!(manager.try_schedule(&queue).unwrap());
        assert!(!manager.try_schedule(&queue).unwrap());
        assert_eq!(manager.state(&queue).unwrap(), ProcessorState::Scheduled);

        assert!(manager.start_running(&queue).unwrap());
        assert!(!manager.start_running(&queue).unwrap());
        assert_eq!(manager.state(&queue).unwrap(), ProcessorState::Running);

        assert!(!manager.finish(&queue).unwrap());
        assert_eq!(manager.state(&queue).unwrap(), ProcessorState::Idle);
    }

    #[test]
    fn test_request_while_running_folds_into_another_pass() {
        let manager = ProcessorStateManager::new();
        let queue = Identifier::from("orders");

        manager.try_schedule(&queue).unwrap();
        manager.start_running(&queue).unwrap();

        // The running task owns the follow-up; nobody else should start one
        assert!(!manager.try_schedule(&queue).unwrap());
        assert!(manager.finish(&queue).unwrap());
        assert!(manager.start_running(&queue).unwrap());
        assert!(!manager.finish(&queue).unwrap());
    }

    #[test]
    fn test_destinations_are_independent() {
        let manager = ProcessorStateManager::new();
        assert!(manager.try_schedule(&Identifier::from("a")).unwrap());
        assert!(manager.try_schedule(&Identifier::from("b")).unwrap());

        manager.remove(&Identifier::from("a")).unwrap();
        assert_eq!(
            manager.state(&Identifier::from("a")).unwrap(),
            ProcessorState::Idle
        );
        assert_eq!(
            manager.state(&Identifier::from("b")).unwrap(),
            ProcessorState::Scheduled
        );
    }

    #[test]
    fn test_concurrent_requests_start_exactly_one_task() {
        let manager = Arc::new(ProcessorStateManager::new());
        let queue = Identifier::from("contended");
        let started = Arc::new(AtomicUsize::new(0));
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let queue = queue.clone();
                let started = Arc::clone(&started);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    if manager.try_schedule(&queue).unwrap() {
                        started.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(&queue).unwrap(), ProcessorState::Scheduled);
    }
}
