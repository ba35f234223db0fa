//! Scope guards and instrumentation macros
//!
//! Sections must be entered and left in strict LIFO order per thread. The
//! guards make that automatic: the section closes when the guard drops, on
//! every exit path including `?` and panics.
//!
//! ```
//! use framescope::{profile_region, profile_scope, Capture, Configuration};
//!
//! let capture = Capture::new(Configuration {
//!     max_threads: 4,
//!     max_entries_per_thread: 1024,
//!     ..Configuration::default()
//! })
//! .unwrap();
//! {
//!     profile_region!(capture);
//!     profile_scope!(capture, "decode_block");
//!     // work
//! }
//! ```

use super::Capture;
use crate::color::Color;

/// Closes its section when dropped
#[must_use = "the section closes as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SectionGuard<'a> {
    capture: &'a Capture,
}

impl Drop for SectionGuard<'_> {
    fn drop(&mut self) {
        self.capture.leave_section();
    }
}

/// Ends its region when dropped
#[must_use = "the region ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct RegionGuard<'a> {
    capture: &'a Capture,
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        self.capture.end_region();
    }
}

impl Capture {
    /// Enter a section that lasts as long as the returned guard.
    ///
    /// # Panics
    /// Same conditions as [`Capture::enter_section`].
    pub fn section(&self, name: &str, color: Color, file: &str, line: u32) -> SectionGuard<'_> {
        let line = i32::try_from(line).unwrap_or(i32::MAX);
        self.enter_section(name, color.to_packed(), file, line);
        SectionGuard { capture: self }
    }

    /// Begin a region that ends when the returned guard drops.
    pub fn region(&self) -> RegionGuard<'_> {
        self.begin_region();
        RegionGuard { capture: self }
    }
}

/// Profile the rest of the enclosing block as a named section.
///
/// With a string literal the color is derived from the name once per call
/// site. A third argument sets the color explicitly.
#[macro_export]
macro_rules! profile_scope {
    ($capture:expr, $name:literal) => {
        let _framescope_section = {
            static COLOR: ::std::sync::OnceLock<$crate::color::Color> = ::std::sync::OnceLock::new();
            let color = *COLOR.get_or_init(|| $crate::color::color_from_name($name));
            $crate::Capture::section(&$capture, $name, color, file!(), line!())
        };
    };
    ($capture:expr, $name:expr) => {
        let _framescope_section = {
            let name: &str = $name;
            $crate::Capture::section(&$capture, name, $crate::color::color_from_name(name), file!(), line!())
        };
    };
    ($capture:expr, $name:expr, $color:expr) => {
        let _framescope_section = $crate::Capture::section(&$capture, $name, $color, file!(), line!());
    };
}

/// Profile the rest of the enclosing block as a region.
#[macro_export]
macro_rules! profile_region {
    ($capture:expr) => {
        let _framescope_region = $crate::Capture::region(&$capture);
    };
}

/// Name the calling thread in the capture.
#[macro_export]
macro_rules! profile_name_thread {
    ($capture:expr, $name:expr) => {
        $crate::Capture::name_current_thread(&$capture, $name)
    };
}
