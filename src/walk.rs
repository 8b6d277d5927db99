//! Depth-first directory walk yielding every regular file under a root.
//!
//! The walk is lazy and restartable: each [`FileWalk::new`] performs a
//! fresh traversal and the iterator terminates when the tree is exhausted.
//! A missing root yields an empty walk, so path enumeration stays safe on a
//! stopped fixture.

pub struct FileWalk {
    stack: Vec<std::fs::ReadDir>,
}

impl FileWalk {
    pub fn new(root: &std::path::Path) -> Self {
        let stack = match std::fs::read_dir(root) {
            Ok(entries) => vec![entries],
            Err(_) => Vec::new(),
        };
        FileWalk { stack }
    }
}

impl Iterator for FileWalk {
    type Item = std::io::Result<std::path::PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entries = self.stack.last_mut()?;
            let entry = match entries.next() {
                Some(Ok(entry)) => entry,
                Some(Err(error)) => return Some(Err(error)),
                None => {
                    self.stack.pop();
                    continue;
                }
            };
            let path = entry.path();
            // follows symlinks so linked files count as files
            let metadata = match std::fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(error) => return Some(Err(error)),
            };
            if metadata.is_dir() {
                match std::fs::read_dir(&path) {
                    Ok(sub) => self.stack.push(sub),
                    Err(error) => return Some(Err(error)),
                }
            } else if metadata.is_file() {
                return Some(Ok(path));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> std::path::PathBuf {
        let mut idx = 0;
        let root = loop {
            let dir = std::env::temp_dir().join(format!("walk_test_{}_{idx}", std::process::id()));
            match std::fs::create_dir(&dir) {
                Ok(()) => break dir,
                Err(_) => idx += 1,
            }
        };
        // root
        // |- 0.txt
        // |- sub
        //    |- 1.txt
        //    |- 2.txt
        std::fs::write(root.join("0.txt"), "0").unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();
        std::fs::write(root.join("sub").join("1.txt"), "1").unwrap();
        std::fs::write(root.join("sub").join("2.txt"), "2").unwrap();
        root
    }

    #[test]
    fn walk_finds_every_regular_file() {
        let root = setup();
        let mut names: Vec<String> = FileWalk::new(&root)
            .map(|entry| {
                entry
                    .unwrap()
                    .strip_prefix(&root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        names.sort();
        assert_eq!(names, vec!["0.txt", "sub/1.txt", "sub/2.txt"]);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn walk_is_restartable() {
        let root = setup();
        let first: Vec<_> = FileWalk::new(&root).map(Result::unwrap).collect();
        let second: Vec<_> = FileWalk::new(&root).map(Result::unwrap).collect();
        assert_eq!(first, second);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn missing_root_yields_empty_walk() {
        let walk = FileWalk::new(std::path::Path::new("/no/such/root/anywhere"));
        assert_eq!(walk.count(), 0);
    }
}
