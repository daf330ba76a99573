use super::{now, PgStore};
use crate::{
    models::{NewUser, User},
    schema::assist::users,
    sql_functions::lower,
    status::Role,
    store::{user_not_found, UserStore},
    Error,
};
use diesel::prelude::*;
use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, RunQueryDsl};

#[derive(Insertable)]
#[diesel(table_name = users)]
struct UserRow {
    username: String,
    password_hash: String,
    name: String,
    role: Role,
    email: Option<String>,
    phone: Option<String>,
    enabled: bool,
    created: jiff_diesel::Timestamp,
    updated: jiff_diesel::Timestamp,
}

impl UserRow {
    fn new(user: NewUser, now: jiff_diesel::Timestamp) -> Self {
        UserRow {
            username: user.username,
            password_hash: user.password_hash,
            name: user.name,
            role: user.role,
            email: user.email,
            phone: user.phone,
            enabled: true,
            created: now,
            updated: now,
        }
    }
}

#[async_trait::async_trait]
impl UserStore for PgStore {
    #[tracing::instrument(skip(self, user), fields(username = %user.username))]
    async fn create_user(&self, user: NewUser) -> Result<User, Error> {
        let row = UserRow::new(user, now());
        let mut conn = self.connection().await?;
        diesel::insert_into(users::table)
            .values(row)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self, new_users), fields(count = new_users.len()))]
    async fn create_users(&self, new_users: Vec<NewUser>) -> Result<Vec<User>, Error> {
        let now = now();
        let rows: Vec<UserRow> = new_users.into_iter().map(|u| UserRow::new(u, now)).collect();
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    diesel::insert_into(users::table)
                        .values(rows)
                        .returning(User::as_returning())
                        .get_results(conn)
                        .await
                        .map_err(Error::from)
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn load_user_by_username(&self, username: &str) -> Result<Option<User>, Error> {
        let mut conn = self.connection().await?;
        users::table
            .filter(lower(users::username).eq(lower(username)))
            .select(User::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    async fn load_user_by_id(&self, user_id: i32) -> Result<Option<User>, Error> {
        let mut conn = self.connection().await?;
        users::table
            .find(user_id)
            .select(User::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    async fn list_users(&self) -> Result<Vec<User>, Error> {
        let mut conn = self.connection().await?;
        users::table
            .order(users::id.asc())
            .select(User::as_select())
            .load(&mut conn)
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self, password_hash))]
    async fn update_password(&self, user_id: i32, password_hash: String) -> Result<(), Error> {
        let now = now();
        self.connection()
            .await?
            .transaction(move |conn| {
                async move {
                    match diesel::update(users::table.find(user_id))
                        .set((users::password_hash.eq(password_hash), users::updated.eq(now)))
                        .execute(conn)
                        .await
                    {
                        Ok(0) => Err(user_not_found(user_id)),
                        Ok(_) => Ok(()),
                        Err(err) => Err(err.into()),
                    }
                }
                .scope_boxed()
            })
            .await
    }
}
