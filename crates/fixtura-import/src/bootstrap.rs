use tracing::info;

use fixtura_core::{Attributes, FieldValue};

use crate::errors::ImportResult;
use crate::session::ImportSession;

/// Seeds every fixture unless the admin user already exists.
///
/// Returns `false` when the store was already seeded and nothing was
/// imported.
pub async fn load_fixtures(session: &ImportSession) -> ImportResult<bool> {
    let options = session.options();
    if let Some(email) = &options.admin_email {
        let mut filter = Attributes::new();
        filter.insert("email".to_string(), FieldValue::from(email.as_str()));
        if session
            .store()
            .find_one(&options.users_collection, &filter)
            .await?
            .is_some()
        {
            info!(email = %email, "fixtures already loaded");
            return Ok(false);
        }
    }

    info!(base_dir = %options.base_dir.display(), "starting fixture import");
    session.reset_report();
    session.import_fixtures("").await?;
    session.report().log_summary();
    Ok(true)
}
