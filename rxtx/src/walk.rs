use anyhow::Context;
use async_recursion::async_recursion;

/// Collect every regular file below `dir`
///
/// Symlinks and special files are skipped. A subdirectory that cannot be read is logged and
/// skipped so that the remaining files are still handled; only a failure to read `dir` itself
/// is returned.
pub async fn regular_files(dir: &std::path::Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let mut files = vec![];
    collect(dir, &mut files).await?;
    Ok(files)
}

#[async_recursion]
async fn collect(
    dir: &std::path::Path,
    files: &mut Vec<std::path::PathBuf>,
) -> anyhow::Result<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot open directory {:?} for reading", dir))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing directory {:?}", dir))?
    {
        let entry_path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(error) => {
                tracing::error!("cannot read file type of {:?}: {}", entry_path, error);
                continue;
            }
        };
        if file_type.is_file() {
            files.push(entry_path);
        } else if file_type.is_dir() {
            if let Err(error) = collect(&entry_path, files).await {
                tracing::error!("{:#}", error);
            }
        } else {
            tracing::debug!("skipping {:?}: not a regular file", entry_path);
        }
    }
    Ok(())
}
