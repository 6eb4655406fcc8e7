pub(crate) const BOOTSTRAP_UP: &str = "\
CREATE TABLE IF NOT EXISTS schema_migrations (\
version INTEGER, \
created_at TIMESTAMP WITHOUT TIME ZONE DEFAULT CURRENT_TIMESTAMP, \
up TEXT, \
down TEXT); \
CREATE TABLE IF NOT EXISTS schema_lock (\
locked_at TIMESTAMP WITHOUT TIME ZONE NULL, \
onerow BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (onerow)); \
INSERT INTO schema_lock (locked_at) VALUES (NULL) ON CONFLICT DO NOTHING;";

pub(crate) const BOOTSTRAP_DOWN: &str =
    "DROP TABLE IF EXISTS schema_lock; DROP TABLE IF EXISTS schema_migrations;";

pub(crate) const CURRENT_VERSION: &str =
    "SELECT version FROM schema_migrations ORDER BY version DESC LIMIT 1";

pub(crate) const DRIFTED_VERSIONS: &str =
    "SELECT version, up, down FROM schema_migrations WHERE version > $1 ORDER BY version";

pub(crate) const INSERT_VERSION: &str =
    "INSERT INTO schema_migrations (version, up, down) VALUES ($1, $2, $3)";

pub(crate) const DELETE_VERSION: &str = "DELETE FROM schema_migrations WHERE version = $1";

pub(crate) const ACQUIRE_LOCK: &str = "\
UPDATE schema_lock SET locked_at = now() \
WHERE locked_at IS NULL OR locked_at < now() - make_interval(secs => $1) \
RETURNING locked_at";

pub(crate) const RELEASE_LOCK: &str = "UPDATE schema_lock SET locked_at = NULL";

pub(crate) const DESTROY: &str = r"DO $$ DECLARE
  r RECORD;
BEGIN
  FOR r IN (SELECT tablename FROM pg_tables WHERE schemaname = current_schema()) LOOP
    EXECUTE 'DROP TABLE IF EXISTS ' || quote_ident(r.tablename) || ' CASCADE';
  END LOOP;
  FOR r IN (SELECT DISTINCT typname FROM pg_type INNER JOIN pg_enum ON pg_enum.enumtypid = pg_type.oid) LOOP
    EXECUTE 'DROP TYPE IF EXISTS ' || quote_ident(r.typname) || ' CASCADE';
  END LOOP;
END $$;";

pub(crate) const MIGRATIONS_TABLE: &str = "schema_migrations";
pub(crate) const LOCK_TABLE: &str = "schema_lock";
