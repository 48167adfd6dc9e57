use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, stdin, BufReader, Read};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock seconds since the epoch.
pub fn realtime() -> f64 {
    let now = SystemTime::now();
    let since_epoch = now.duration_since(UNIX_EPOCH).expect("Time went backwards");
    since_epoch.as_secs_f64()
}

/// Combined user + system CPU seconds for this process.
pub fn cputime() -> f64 {
    let rusage = unsafe {
        let mut rusage = std::mem::MaybeUninit::uninit();
        libc::getrusage(libc::RUSAGE_SELF, rusage.as_mut_ptr());
        rusage.assume_init()
    };
    let user_time = rusage.ru_utime;
    let sys_time = rusage.ru_stime;
    (user_time.tv_sec as f64 + user_time.tv_usec as f64 * 1e-6)
        + (sys_time.tv_sec as f64 + sys_time.tv_usec as f64 * 1e-6)
}

const OPEN_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Open a file for reading, treating "-" as standard input.
pub fn xopen(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    if path.to_str() == Some("-") {
        return Ok(Box::new(stdin()));
    }
    let file = File::open(path)?;
    Ok(Box::new(BufReader::with_capacity(OPEN_BUFFER_SIZE, file)))
}

/// Like `xopen`, with transparent gzip decompression for `.gz` paths.
pub fn xzopen(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    let input = xopen(path)?;
    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        Ok(Box::new(GzDecoder::new(input)))
    } else {
        Ok(input)
    }
}
