use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const SLICE: Duration = Duration::from_millis(25);


/// Sleep for `total`, waking early once `flag` is set.
pub fn sleep_unless(flag: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while !flag.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SLICE.min(deadline - now));
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn raised_flag_cuts_the_sleep_short() {
        let flag = Arc::new(AtomicBool::new(false));
        let raiser = flag.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            raiser.store(true, Ordering::SeqCst);
        });
        let started = Instant::now();
        sleep_unless(&flag, Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(5));
        t.join().unwrap();
    }
}
