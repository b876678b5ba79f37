//! The guided walkthrough: twelve numbered actions against two fresh buckets, ending with both
//! buckets purged and deleted.
use std::{
    future::Future,
    io,
    path::{Path, PathBuf},
};

use observability_deps::tracing::{info, warn};
use s3lab_client::{
    AccessControlPolicy, CannedAcl, ObjectStorage, VersioningStatus,
    console::{self, Tab},
    ops,
    purge::{PurgeOptions, PurgeSummary},
};

use super::{acl::print_policy, common::CommonConfig};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("invalid storage configuration: {0}")]
    Config(#[from] s3lab_clap_blocks::storage::ParseError),

    #[error("cannot prepare working directory: {0}")]
    WorkDir(#[source] io::Error),

    #[error("action ({step}) {name} failed: {source}")]
    Step {
        step: u8,
        name: &'static str,
        #[source]
        source: s3lab_client::Error,
    },
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(flatten)]
    pub(crate) common: CommonConfig,

    /// Run every action without waiting for enter in between
    #[clap(long = "no-pause")]
    no_pause: bool,

    /// Directory for the generated files. A temporary directory when unset.
    #[clap(long = "work-dir")]
    work_dir: Option<PathBuf>,

    /// Directory downloads are written to, `<work-dir>/downloads` when unset
    #[clap(long = "download-dir")]
    download_dir: Option<PathBuf>,
}

/// File name, repeat count and content of the files the walkthrough generates
const FILES: [(&str, usize, &str); 3] = [
    ("firstfile.txt", 300, "FIRSTFILE_TEXT_CONTENT"),
    ("secondfile.txt", 400, "SECONDFILE_TEXT_CONTENT"),
    ("thirdfile.txt", 300, "THIRDFILE_TEXT_CONTENT"),
];

const CLIENT_BUCKET_PREFIX: &str = "s3-client-";
const RESOURCE_BUCKET_PREFIX: &str = "s3-resource-";

/// Everything a finished walkthrough created, used and removed
#[derive(Debug)]
pub(crate) struct Report {
    pub(crate) client_bucket: String,
    pub(crate) resource_bucket: String,
    pub(crate) files: Vec<PathBuf>,
    pub(crate) downloaded: PathBuf,
    pub(crate) acl_before: AccessControlPolicy,
    pub(crate) acl_after: AccessControlPolicy,
    pub(crate) versioning: VersioningStatus,
    pub(crate) new_version_id: Option<String>,
    pub(crate) purge: PurgeSummary,
}

pub(crate) async fn command(config: Config) -> Result<()> {
    let storage = config.common.storage.make_storage().await?;

    // keep the guard alive until the walkthrough is over
    let (_temp_dir, work_dir) = match config.work_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir).map_err(Error::WorkDir)?;
            (None, dir)
        }
        None => {
            let dir = tempfile::TempDir::new().map_err(Error::WorkDir)?;
            let path = dir.path().to_path_buf();
            (Some(dir), path)
        }
    };
    let download_dir = config
        .download_dir
        .unwrap_or_else(|| work_dir.join("downloads"));

    let walkthrough = Walkthrough {
        store: storage.store.as_ref(),
        region: storage.region.as_deref(),
        work_dir: &work_dir,
        download_dir: &download_dir,
        pause: !config.no_pause,
    };
    let report = walkthrough.run().await?;
    info!(
        client_bucket = %report.client_bucket,
        resource_bucket = %report.resource_bucket,
        files = report.files.len(),
        downloaded = %report.downloaded.display(),
        public_before = report.acl_before.is_public_read(),
        public_after = report.acl_after.is_public_read(),
        versioning = %report.versioning,
        new_version_id = report.new_version_id.as_deref().unwrap_or("null"),
        purged = report.purge.total(),
        "walkthrough finished"
    );
    Ok(())
}

#[derive(Debug)]
struct Walkthrough<'a> {
    store: &'a dyn ObjectStorage,
    region: Option<&'a str>,
    work_dir: &'a Path,
    download_dir: &'a Path,
    pause: bool,
}

impl Walkthrough<'_> {
    /// Run every action in order. On failure the buckets created so far are purged and deleted
    /// before the failing action's error is returned.
    async fn run(&self) -> Result<Report> {
        let mut created = Vec::new();
        match self.actions(&mut created).await {
            Ok(report) => Ok(report),
            Err(e) => {
                for bucket in created.iter().rev() {
                    match ops::delete_bucket(self.store, bucket, Some(PurgeOptions::default()))
                        .await
                    {
                        Ok(_) => info!(bucket, "cleaned up bucket after failure"),
                        Err(cleanup) => warn!(bucket, %cleanup, "failed to clean up bucket"),
                    }
                }
                Err(e)
            }
        }
    }

    async fn actions(&self, created: &mut Vec<String>) -> Result<Report> {
        let store = self.store;
        let region = self.region;

        self.action(1, "Creates 2 buckets");
        let client_bucket = step(
            1,
            "create buckets",
            ops::create_bucket_with_prefix(store, CLIENT_BUCKET_PREFIX, region),
        )
        .await?;
        created.push(client_bucket.clone());
        let resource_bucket = step(
            1,
            "create buckets",
            ops::create_bucket_with_prefix(store, RESOURCE_BUCKET_PREFIX, region),
        )
        .await?;
        created.push(resource_bucket.clone());
        self.completed("To check buckets go to links below:");
        println!(
            "client_bucket: {}",
            console::bucket_link(&client_bucket, region, None)
        );
        println!(
            "resource_bucket: {}",
            console::bucket_link(&resource_bucket, region, None)
        );
        self.wait();

        self.action(2, "Creates 3 random files");
        let mut files = Vec::with_capacity(FILES.len());
        for (name, size, content) in FILES {
            let path = step(
                2,
                "create files",
                ops::create_temp_file(self.work_dir, size, name, content),
            )
            .await?;
            files.push(path);
        }
        self.completed("To check generated files open them at these paths:");
        for (n, path) in files.iter().enumerate() {
            println!("{}) {}", n + 1, path.display());
        }
        self.wait();

        let first_file = &files[0];
        let first_key = file_key(first_file);
        let second_file = &files[1];
        let second_key = file_key(second_file);

        self.action(3, "Upload first file to s3-resource bucket");
        step(
            3,
            "upload first file",
            ops::upload_file(store, first_file, &resource_bucket, &first_key, None),
        )
        .await?;
        self.completed("To check the uploaded file go to the link below:");
        println!(
            "{}",
            console::object_link(&resource_bucket, &first_key, region, None)
        );
        self.wait();

        self.action(4, "Downloads first file back to the download folder");
        let downloaded = self.download_dir.join(&first_key);
        step(
            4,
            "download first file",
            ops::download_file(store, &resource_bucket, &first_key, &downloaded),
        )
        .await?;
        self.completed("To check the downloaded file open it at this path:");
        println!("{}", downloaded.display());
        self.wait();

        self.action(
            5,
            "Copying first file from s3-resource bucket to s3-client bucket",
        );
        step(
            5,
            "copy first file",
            ops::copy_to_bucket(store, &resource_bucket, &client_bucket, &first_key),
        )
        .await?;
        self.completed("To check the copied file go to the link below:");
        println!(
            "{}",
            console::object_link(&client_bucket, &first_key, region, None)
        );
        self.wait();

        self.action(6, "Deletes the copy from s3-client bucket");
        step(
            6,
            "delete copy",
            store.delete_object(&client_bucket, &first_key),
        )
        .await?;
        self.completed("Check that the file is gone with the links below:");
        println!(
            "Deleted file: {}",
            console::object_link(&client_bucket, &first_key, region, None)
        );
        println!(
            "client_bucket: {}",
            console::bucket_link(&client_bucket, region, None)
        );
        self.wait();

        self.action(
            7,
            "Upload second file to s3-resource bucket and making it public",
        );
        step(
            7,
            "upload public file",
            ops::upload_file(
                store,
                second_file,
                &resource_bucket,
                &second_key,
                Some(CannedAcl::PublicRead),
            ),
        )
        .await?;
        self.completed("Download this file in a private browser window to check it is public:");
        println!(
            "{}",
            console::public_object_url(&resource_bucket, &second_key, region)
        );
        self.wait();

        self.action(8, "Print out ACL of the second file that was just uploaded");
        let acl_before = step(
            8,
            "read ACL",
            store.get_object_acl(&resource_bucket, &second_key),
        )
        .await?;
        print_policy(&acl_before);
        self.completed("Check the ACL at this link:");
        println!(
            "{}",
            console::object_link(&resource_bucket, &second_key, region, Some(Tab::Permissions))
        );
        self.wait();

        self.action(9, "Changes this file ACL to 'private' setting");
        let acl_after = step(9, "make file private", async {
            store
                .put_object_acl(&resource_bucket, &second_key, CannedAcl::Private)
                .await?;
            store.get_object_acl(&resource_bucket, &second_key).await
        })
        .await?;
        print_policy(&acl_after);
        self.completed("Check the ACL again at this link:");
        println!(
            "{}",
            console::object_link(&resource_bucket, &second_key, region, Some(Tab::Permissions))
        );
        println!("The file should no longer open in a new private browser window:");
        println!(
            "{}",
            console::public_object_url(&resource_bucket, &second_key, region)
        );
        self.wait();

        self.action(10, "Enables file versioning in s3-resource bucket");
        let versioning = step(
            10,
            "enable versioning",
            ops::enable_versioning(store, &resource_bucket),
        )
        .await?;
        println!("{versioning}");
        self.completed("Check the bucket properties at this link:");
        println!(
            "{}",
            console::bucket_link(&resource_bucket, region, Some(Tab::Properties))
        );
        self.wait();

        self.action(
            11,
            "Try version control by uploading new version of second file",
        );
        let new_version_id = step(
            11,
            "upload new version",
            ops::upload_file(store, second_file, &resource_bucket, &second_key, None),
        )
        .await?;
        println!("{}", new_version_id.as_deref().unwrap_or("null"));
        self.completed("Check the versions at this link:");
        println!(
            "{}",
            console::object_link(&resource_bucket, &second_key, region, Some(Tab::Versions))
        );
        self.wait();

        self.action(12, "Deletes created buckets");
        let purge = step(
            12,
            "delete buckets",
            ops::delete_bucket(store, &resource_bucket, Some(PurgeOptions::default())),
        )
        .await?
        .unwrap_or_default();
        created.retain(|b| b != &resource_bucket);
        step(
            12,
            "delete buckets",
            ops::delete_bucket(store, &client_bucket, None),
        )
        .await?;
        created.clear();
        println!(
            "Purged {} object versions and {} delete markers",
            purge.versions, purge.delete_markers
        );
        self.completed("Check the bucket list at this link:");
        println!("{}", console::buckets_link(region));

        Ok(Report {
            client_bucket,
            resource_bucket,
            files,
            downloaded,
            acl_before,
            acl_after,
            versioning,
            new_version_id,
            purge,
        })
    }

    fn action(&self, step: u8, title: &str) {
        println!("ACTION ({step}): {title}");
    }

    fn completed(&self, hint: &str) {
        println!("ACTION: COMPLETED");
        println!("ACTION: {hint}\n");
    }

    fn wait(&self) {
        if self.pause {
            println!("Press enter to continue...");
            let mut line = String::new();
            let _ = io::stdin().read_line(&mut line);
        }
        println!();
    }
}

/// Attach the action number and name to a failed storage operation
async fn step<T: Send>(
    step: u8,
    name: &'static str,
    operation: impl Future<Output = s3lab_client::Result<T>> + Send,
) -> Result<T> {
    operation
        .await
        .map_err(|source| Error::Step { step, name, source })
}

fn file_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use s3lab_client::{
        DeleteOutcome, ListVersionsRequest, VersionPage, VersionRef, VersioningState,
        memory::InMemoryStorage,
    };

    use super::*;

    fn walkthrough<'a>(
        store: &'a dyn ObjectStorage,
        dir: &'a Path,
        downloads: &'a Path,
    ) -> Walkthrough<'a> {
        Walkthrough {
            store,
            region: None,
            work_dir: dir,
            download_dir: downloads,
            pause: false,
        }
    }

    #[test_log::test(tokio::test)]
    async fn walkthrough_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        let store = InMemoryStorage::new();

        let report = walkthrough(&store, dir.path(), &downloads)
            .run()
            .await
            .unwrap();

        assert!(store.bucket_names().is_empty());
        assert!(report.client_bucket.starts_with(CLIENT_BUCKET_PREFIX));
        assert!(report.resource_bucket.starts_with(RESOURCE_BUCKET_PREFIX));
        assert_eq!(report.files.len(), 3);

        let first = std::fs::read_to_string(&report.downloaded).unwrap();
        assert_eq!(first, "FIRSTFILE_TEXT_CONTENT".repeat(300));
        assert!(report.downloaded.starts_with(&downloads));

        assert!(report.acl_before.is_public_read());
        assert!(!report.acl_after.is_public_read());
        assert_eq!(report.versioning, VersioningStatus::Enabled);
        assert!(report.new_version_id.is_some());

        // first file and second file from before versioning, plus the new second file version
        assert_eq!(report.purge.versions, 3);
        assert_eq!(report.purge.delete_markers, 0);
    }

    /// Delegates to an in-memory store but refuses to change versioning
    #[derive(Debug)]
    struct NoVersioning(Arc<InMemoryStorage>);

    #[async_trait]
    impl ObjectStorage for NoVersioning {
        async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> s3lab_client::Result<()> {
            self.0.create_bucket(bucket, region).await
        }

        async fn delete_bucket(&self, bucket: &str) -> s3lab_client::Result<()> {
            self.0.delete_bucket(bucket).await
        }

        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            body: Bytes,
            acl: Option<CannedAcl>,
        ) -> s3lab_client::Result<Option<String>> {
            self.0.put_object(bucket, key, body, acl).await
        }

        async fn get_object(&self, bucket: &str, key: &str) -> s3lab_client::Result<Bytes> {
            self.0.get_object(bucket, key).await
        }

        async fn copy_object(
            &self,
            src_bucket: &str,
            src_key: &str,
            dst_bucket: &str,
            dst_key: &str,
        ) -> s3lab_client::Result<()> {
            self.0
                .copy_object(src_bucket, src_key, dst_bucket, dst_key)
                .await
        }

        async fn delete_object(&self, bucket: &str, key: &str) -> s3lab_client::Result<()> {
            self.0.delete_object(bucket, key).await
        }

        async fn get_object_acl(
            &self,
            bucket: &str,
            key: &str,
        ) -> s3lab_client::Result<AccessControlPolicy> {
            self.0.get_object_acl(bucket, key).await
        }

        async fn put_object_acl(
            &self,
            bucket: &str,
            key: &str,
            acl: CannedAcl,
        ) -> s3lab_client::Result<()> {
            self.0.put_object_acl(bucket, key, acl).await
        }

        async fn get_bucket_versioning(
            &self,
            bucket: &str,
        ) -> s3lab_client::Result<VersioningStatus> {
            self.0.get_bucket_versioning(bucket).await
        }

        async fn put_bucket_versioning(
            &self,
            _bucket: &str,
            _state: VersioningState,
        ) -> s3lab_client::Result<()> {
            Err(s3lab_client::Error::AccessDenied {
                message: "versioning is locked".into(),
            })
        }

        async fn list_object_versions(
            &self,
            bucket: &str,
            request: ListVersionsRequest,
        ) -> s3lab_client::Result<VersionPage> {
            self.0.list_object_versions(bucket, request).await
        }

        async fn delete_objects(
            &self,
            bucket: &str,
            objects: &[VersionRef],
        ) -> s3lab_client::Result<DeleteOutcome> {
            self.0.delete_objects(bucket, objects).await
        }
    }

    #[tokio::test]
    async fn failed_action_cleans_up_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        let inner = Arc::new(InMemoryStorage::new());
        let store = NoVersioning(Arc::clone(&inner));

        let err = walkthrough(&store, dir.path(), &downloads)
            .run()
            .await
            .unwrap_err();

        match err {
            Error::Step { step, source, .. } => {
                assert_eq!(step, 10);
                assert!(matches!(source, s3lab_client::Error::AccessDenied { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(inner.bucket_names().is_empty());
    }

    #[tokio::test]
    async fn command_runs_against_memory_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            common: CommonConfig {
                storage: s3lab_clap_blocks::storage::StorageConfig::memory(),
                logging_config: clap::Parser::parse_from(["logging"]),
            },
            no_pause: true,
            work_dir: Some(dir.path().join("work")),
            download_dir: None,
        };

        command(config).await.unwrap();

        assert!(dir.path().join("work").join("downloads").is_dir());
    }
}
