// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! The one place where facades and engine handles meet.
//!
//! Every facade method goes through [`derive`], [`engine`] or
//! [`apply_scope`]. Reaching the wrapped [`Db`] needs a [`sealed::Token`],
//! which only this crate can construct, so generic code bounded on the
//! public traits cannot unwrap a facade either.

use spread_db_engine::Db;
use tracing::warn;

pub(crate) mod sealed {
    use spread_db_engine::Db;

    /// Access token for the facade seam.
    #[derive(Debug, Clone, Copy)]
    pub struct Token(());

    pub(crate) const TOKEN: Token = Token(());

    /// A facade over one engine handle.
    pub trait Handle: Sized {
        #[doc(hidden)]
        fn wrap(db: Db, token: Token) -> Self;
        #[doc(hidden)]
        fn handle(&self, token: Token) -> &Db;
        #[doc(hidden)]
        fn into_handle(self, token: Token) -> Db;
    }
}

use sealed::{Handle, TOKEN};

/// Build a facade of the same capability around `f`'s result.
pub(crate) fn derive<H: Handle>(facade: &H, f: impl FnOnce(&Db) -> Db) -> H {
    H::wrap(f(facade.handle(TOKEN)), TOKEN)
}

pub(crate) fn engine<H: Handle>(facade: &H) -> &Db {
    facade.handle(TOKEN)
}

pub(crate) fn wrap<H: Handle>(db: Db) -> H {
    H::wrap(db, TOKEN)
}

pub(crate) fn unwrap<H: Handle>(facade: H) -> Db {
    facade.into_handle(TOKEN)
}

/// Run a facade-typed scope over a raw handle.
///
/// A scope that returns a facade bound to a different database is ignored
/// with a warning, and the incoming handle is passed on unchanged.
pub(crate) fn apply_scope<H, F>(db: Db, scope: F) -> Db
where
    H: Handle,
    F: FnOnce(H) -> H,
{
    let incoming = db.clone();
    let scoped = unwrap(scope(wrap::<H>(db)));
    if scoped.same_pool(&incoming) {
        scoped
    } else {
        warn!("Scope returned a handle for another database, ignoring it");
        incoming
    }
}
