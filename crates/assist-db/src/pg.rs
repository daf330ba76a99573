use crate::Error;
use diesel_async::{
    pooled_connection::{mobc::Pool, AsyncDieselConnectionManager},
    AsyncPgConnection,
};

mod applicants;
mod applications;
mod maker_checker;
mod reference;
mod users;

/// PostgreSQL backed store. Every mutating operation runs in a single transaction.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: Pool<AsyncPgConnection>,
}

impl PgStore {
    pub(crate) fn new(pool: Pool<AsyncPgConnection>) -> Self {
        PgStore { pool }
    }

    pub(crate) async fn connection(
        &self,
    ) -> Result<mobc::Connection<AsyncDieselConnectionManager<AsyncPgConnection>>, Error> {
        self.pool.get().await.map_err(Into::into)
    }
}

fn now() -> jiff_diesel::Timestamp {
    jiff::Timestamp::now().into()
}

/// `%text%` for `ILIKE`, with the pattern metacharacters escaped.
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    #[test]
    fn contains_pattern_escapes_wildcards() {
        assert_eq!(super::contains_pattern("jo"), "%jo%");
        assert_eq!(super::contains_pattern("50%_"), "%50\\%\\_%");
    }
}
