use std::sync::{atomic::{AtomicBool, Ordering}, Arc};

use crate::{config::ExecutionConfig, error::{ExecutionError, Result}};

// Can be handed to another thread (e.g. a signal handler) to cancel a running query
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn new() -> Self {
        InterruptHandle::default()
    }

    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// Everything an operator needs from the outside while producing chunks
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub config: ExecutionConfig,
    interrupt: InterruptHandle,
}

impl ExecutionContext {
    pub fn new(config: ExecutionConfig) -> Self {
        ExecutionContext { config, interrupt: InterruptHandle::new() }
    }

    pub fn with_interrupt(config: ExecutionConfig, interrupt: InterruptHandle) -> Self {
        ExecutionContext { config, interrupt }
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.is_interrupted() {
            Err(ExecutionError::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_interrupt_from_other_thread() {
        let context = ExecutionContext::new(ExecutionConfig::default());
        let handle = context.interrupt_handle();
        assert!(context.check_interrupt().is_ok());
        std::thread::spawn(move || handle.interrupt()).join().unwrap();
        assert_eq!(context.check_interrupt(), Err(ExecutionError::Interrupted));
        // a context built around a fresh handle is not affected
        let other = ExecutionContext::with_interrupt(ExecutionConfig::default(), InterruptHandle::new());
        assert!(other.check_interrupt().is_ok());
    }
}
