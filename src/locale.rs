// 🌍 Scoped locale for date labels
//
// Month names in period labels are printed in the publisher's language.
// The active formatting locale is thread-local and can only be changed
// through `LocaleScope`, which restores the previous locale when dropped
// (normal return, `?` early return or unwinding).

use chrono::{Locale, NaiveDate};
use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static ACTIVE: Cell<Locale> = const { Cell::new(Locale::POSIX) };
}

/// Locale currently used by `format_date` on this thread
pub fn current() -> Locale {
    ACTIVE.with(|l| l.get())
}

/// RAII guard overriding the formatting locale for its lifetime
#[must_use = "the locale is restored as soon as the scope is dropped"]
pub struct LocaleScope {
    previous: Locale,
    // Tied to the thread whose locale it changed
    _not_send: PhantomData<*const ()>,
}

impl LocaleScope {
    pub fn enter(locale: Locale) -> Self {
        let previous = ACTIVE.with(|l| l.replace(locale));
        tracing::trace!(?locale, ?previous, "locale override");
        LocaleScope {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for LocaleScope {
    fn drop(&mut self) {
        ACTIVE.with(|l| l.set(self.previous));
    }
}

/// Format a date with strftime syntax in the active locale
pub fn format_date(date: NaiveDate, fmt: &str) -> String {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().format_localized(fmt, current()).to_string())
        .unwrap_or_default()
}

/// Run `f` with `locale` active; the previous locale is back once it returns
pub fn with_locale<T>(locale: Locale, f: impl FnOnce() -> T) -> T {
    let _scope = LocaleScope::enter(locale);
    f()
}
