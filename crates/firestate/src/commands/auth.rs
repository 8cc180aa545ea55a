//! `auth`: bind to the auth stream, then resolve the session.

use std::sync::Arc;

use firestate_core::{MemoryAuth, MemoryDatabase, User};

use super::{live_data, load_config};
use crate::cli::{AuthArgs, GlobalOpts};
use crate::error::CliError;
use crate::output::print_state;

pub fn handle(args: AuthArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_config(global)?;
    let auth = Arc::new(MemoryAuth::new());
    let live = live_data(&cfg, Arc::clone(&auth), Arc::new(MemoryDatabase::new()))?;

    let binding = live.auth();
    print_state("attach", &binding.state())?;

    auth.resolve(session_user(&args));
    print_state("resolve", &binding.state())?;

    if args.sign_out {
        auth.sign_out();
        print_state("sign-out", &binding.state())?;
    }
    Ok(())
}

fn session_user(args: &AuthArgs) -> Option<User> {
    let uid = args.user.as_deref()?;
    let user = if args.anonymous {
        User::anonymous(uid)
    } else {
        User::new(uid)
    };
    Some(match args.email {
        Some(ref email) => user.with_email(email.as_str()),
        None => user,
    })
}
