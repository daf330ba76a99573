use super::PgStore;
use crate::{
    models::{LocationPath, NewParameter, Parameter, Programme, Village},
    paging::{Page, PageRequest, ParameterSort, SortKey, VillageSort},
    schema::assist::{counties, locations, parameters, programmes, sub_counties, sub_locations, villages},
    store::ReferenceStore,
    Error,
};
use diesel::prelude::*;
use diesel_async::{
    scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection, RunQueryDsl,
};

#[derive(Insertable)]
#[diesel(table_name = parameters)]
struct ParameterRow<'a> {
    category: &'a str,
    value: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = programmes)]
struct ProgrammeRow {
    name: String,
}

#[async_trait::async_trait]
impl ReferenceStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn list_parameters(
        &self,
        category: Option<&str>,
        page: &PageRequest,
    ) -> Result<Page<Parameter>, Error> {
        let (key, descending) = ParameterSort::resolve(page.sort.as_ref())?;
        let filtered = || {
            let mut query = parameters::table.into_boxed();
            if let Some(category) = category {
                query = query.filter(parameters::category.eq(category.to_owned()));
            }
            query
        };
        let mut conn = self.connection().await?;
        let total: i64 = filtered().count().get_result(&mut conn).await?;
        let mut query = filtered();
        query = match (key, descending) {
            (ParameterSort::Id, false) => query.order(parameters::id.asc()),
            (ParameterSort::Id, true) => query.order(parameters::id.desc()),
            (ParameterSort::Category, false) => query.order(parameters::category.asc()),
            (ParameterSort::Category, true) => query.order(parameters::category.desc()),
            (ParameterSort::Value, false) => query.order(parameters::value.asc()),
            (ParameterSort::Value, true) => query.order(parameters::value.desc()),
        };
        let content = query
            .then_order_by(parameters::id.asc())
            .offset(page.offset())
            .limit(page.limit())
            .select(Parameter::as_select())
            .load(&mut conn)
            .await?;
        Ok(Page::new(content, page, total))
    }

    #[tracing::instrument(skip(self))]
    async fn load_parameter(&self, parameter_id: i32) -> Result<Option<Parameter>, Error> {
        let mut conn = self.connection().await?;
        parameters::table
            .find(parameter_id)
            .select(Parameter::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self, new_parameters), fields(count = new_parameters.len()))]
    async fn create_parameters(
        &self,
        new_parameters: Vec<NewParameter>,
    ) -> Result<Vec<Parameter>, Error> {
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    let mut created = Vec::with_capacity(new_parameters.len());
                    for parameter in &new_parameters {
                        // Skips rows already present, including repeats earlier in the same batch.
                        let inserted = diesel::insert_into(parameters::table)
                            .values(ParameterRow {
                                category: &parameter.category,
                                value: &parameter.value,
                            })
                            .on_conflict_do_nothing()
                            .returning(Parameter::as_returning())
                            .get_result(conn)
                            .await
                            .optional()?;
                        created.extend(inserted);
                    }
                    Ok::<_, Error>(created)
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn list_programmes(&self) -> Result<Vec<Programme>, Error> {
        let mut conn = self.connection().await?;
        programmes::table
            .order(programmes::name.asc())
            .select(Programme::as_select())
            .load(&mut conn)
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    async fn load_programme(&self, programme_id: i32) -> Result<Option<Programme>, Error> {
        let mut conn = self.connection().await?;
        programmes::table
            .find(programme_id)
            .select(Programme::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    async fn load_programme_by_name(&self, name: &str) -> Result<Option<Programme>, Error> {
        let mut conn = self.connection().await?;
        programmes::table
            .filter(programmes::name.eq(name))
            .select(Programme::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    async fn create_programme(&self, name: String) -> Result<Programme, Error> {
        let mut conn = self.connection().await?;
        diesel::insert_into(programmes::table)
            .values(ProgrammeRow { name })
            .returning(Programme::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    async fn list_villages(
        &self,
        sub_location_id: Option<i32>,
        page: &PageRequest,
    ) -> Result<Page<Village>, Error> {
        let (key, descending) = VillageSort::resolve(page.sort.as_ref())?;
        let filtered = || {
            let mut query = villages::table.into_boxed();
            if let Some(sub_location_id) = sub_location_id {
                query = query.filter(villages::sub_location_id.eq(sub_location_id));
            }
            query
        };
        let mut conn = self.connection().await?;
        let total: i64 = filtered().count().get_result(&mut conn).await?;
        let mut query = filtered();
        query = match (key, descending) {
            (VillageSort::Id, false) => query.order(villages::id.asc()),
            (VillageSort::Id, true) => query.order(villages::id.desc()),
            (VillageSort::Name, false) => query.order(villages::name.asc()),
            (VillageSort::Name, true) => query.order(villages::name.desc()),
        };
        let content = query
            .then_order_by(villages::id.asc())
            .offset(page.offset())
            .limit(page.limit())
            .select(Village::as_select())
            .load(&mut conn)
            .await?;
        Ok(Page::new(content, page, total))
    }

    #[tracing::instrument(skip(self))]
    async fn load_village(&self, village_id: i32) -> Result<Option<Village>, Error> {
        let mut conn = self.connection().await?;
        villages::table
            .find(village_id)
            .select(Village::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self, paths), fields(count = paths.len()))]
    async fn upsert_location_paths(&self, paths: Vec<LocationPath>) -> Result<Vec<Village>, Error> {
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    let mut created = Vec::with_capacity(paths.len());
                    for path in &paths {
                        created.push(upsert_location_path(conn, path).await?);
                    }
                    Ok::<_, Error>(created)
                }
                .scope_boxed()
            })
            .await
    }
}

/// Inserts the node unless a sibling with the same name exists, then reads it back.
///
/// Each level has a unique `(name, parent)` constraint, so `ON CONFLICT DO NOTHING`
/// followed by a lookup is race free.
macro_rules! find_or_create {
    ($conn:expr, $table:ident, $name:expr, $parent_column:ident = $parent:expr) => {{
        diesel::insert_into($table::table)
            .values(($table::name.eq($name), $table::$parent_column.eq($parent)))
            .on_conflict_do_nothing()
            .execute($conn)
            .await?;
        $table::table
            .filter($table::name.eq($name))
            .filter($table::$parent_column.eq($parent))
            .select($table::id)
            .first::<i32>($conn)
            .await?
    }};
}

async fn upsert_location_path(
    conn: &mut AsyncPgConnection,
    path: &LocationPath,
) -> Result<Village, Error> {
    diesel::insert_into(counties::table)
        .values(counties::name.eq(path.county.as_str()))
        .on_conflict_do_nothing()
        .execute(conn)
        .await?;
    let county_id: i32 = counties::table
        .filter(counties::name.eq(path.county.as_str()))
        .select(counties::id)
        .first(conn)
        .await?;
    let sub_county_id = find_or_create!(conn, sub_counties, path.sub_county.as_str(), county_id = county_id);
    let location_id =
        find_or_create!(conn, locations, path.location.as_str(), sub_county_id = sub_county_id);
    let sub_location_id =
        find_or_create!(conn, sub_locations, path.sub_location.as_str(), location_id = location_id);
    let village_id =
        find_or_create!(conn, villages, path.village.as_str(), sub_location_id = sub_location_id);
    villages::table
        .find(village_id)
        .select(Village::as_select())
        .first(conn)
        .await
        .map_err(Into::into)
}
