use diesel::sql_types::Text;

diesel::define_sql_function! {
    /// SQL `lower(text)`
    fn lower(x: Text) -> Text;
}
