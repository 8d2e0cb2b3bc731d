use flowtrace_parser::{FunctionLocator, TreeSitterLocator, BUILD_SENTINEL};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MINE_ETS: &str = r#"import { PhotoPickerUtils } from '../utils/PhotoPickerUtils';

@Entry
@Component
struct Mine {
  @State imgPath: string = ''

  build() {
    Button('pick').onClick(() => {
      this.pickPhoto();
    })
  }

  async pickPhoto() {
    const uri = await PhotoPickerUtils.openGallery();
    this.imgPath = uri;
  }
}
"#;

const PICKER_TS: &str = r#"export class PhotoPickerUtils {
  static async openGallery(): Promise<string> {
    const picker = new PhotoViewPicker();
    const result = await picker.select();
    return result.photoUris[0];
  }
}
"#;

const NATIVE_CPP: &str = r#"#include <string>

static std::string openGallery(int flags) {
    return std::string("gallery");
}

namespace media {
int Scanner::Scan(const char *path) {
    return 0;
}
}
"#;

const PROFILE_ETS: &str = r#"import { PhotoPickerUtils } from '../utils/PhotoPickerUtils';
import { promptAction } from '@kit.ArkUI';

@Entry({ routeName: 'mine' })
@Component
struct Mine {
  @State imgPath: string = ''
  @State tags: string[] = ['a', 'b']
  private title: string = '我的'

  aboutToAppear() {
    this.imgPath = '';
  }

  build() {
    Column({ space: 10 }) {
      Row() {
        Image(this.imgPath)
          .width(100)
          .height(100)
        Text(`${this.title}: {x}`)
      }.margin(10)
      ForEach(this.tags, (tag: string) => {
        Text(tag).fontSize(12)
      }, (tag: string) => tag)
      if (this.imgPath.length > 0) {
        Stack(){
          Text('x')
        }
      } else {
        Blank()
      }
      Button('pick')
        .onClick(() => {
          this.pickPhoto();
        })
    }
    .width('100%')
    .height('100%')
  }

  @Builder TabBuilder(title: string) {
    Column() {
      Text(title)
    }
  }

  async pickPhoto() {
    const uri = await PhotoPickerUtils.openGallery();
    this.imgPath = uri;
  }
}

@Styles function fillScreen() {
  .width('100%')
  .height('100%')
}

"#;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "entry/pages/Mine.ets", MINE_ETS);
    write(dir.path(), "entry/utils/PhotoPickerUtils.ts", PICKER_TS);
    write(dir.path(), "native/gallery.cpp", NATIVE_CPP);
    write(dir.path(), "entry/README.md", "openGallery() is documented here");
    dir
}

#[test]
fn locates_across_dialects_without_early_exit() {
    let dir = fixture();
    let locator = TreeSitterLocator::new(dir.path());

    let rendered = locator.locate("openGallery", None);
    assert_eq!(rendered.matches("File: ").count(), 2);

    // Walk order is by file name: entry/ before native/.
    let ts_pos = rendered.find("PhotoPickerUtils.ts").unwrap();
    let cpp_pos = rendered.find("gallery.cpp").unwrap();
    assert!(ts_pos < cpp_pos);

    assert!(rendered.contains("    2:   static async openGallery(): Promise<string> {"));
    assert!(rendered.contains("    6:   }"));
    assert!(rendered.contains("    3: static std::string openGallery(int flags) {"));
    assert!(!rendered.contains("README"));
}

#[test]
fn blocks_are_separated_by_a_blank_line() {
    let dir = fixture();
    let locator = TreeSitterLocator::new(dir.path());

    let rendered = locator.locate("openGallery", None);
    let blocks: Vec<&str> = rendered.split("\n\nFile: ").collect();
    assert_eq!(blocks.len(), 2);
    assert!(rendered.starts_with("File: "));
    assert!(rendered.ends_with('\n'));
}

#[test]
fn sentinel_finds_the_ui_callback_in_scope() {
    let dir = fixture();
    let locator = TreeSitterLocator::new(dir.path());
    let pages = dir.path().join("entry/pages");

    let rendered = locator.locate(BUILD_SENTINEL, Some(&pages));
    assert_eq!(rendered.matches("File: ").count(), 1);
    assert!(rendered.contains("Mine.ets"));
    assert!(rendered.contains("    8:   build() {"));
    assert!(rendered.contains("   10:       this.pickPhoto();"));
    assert!(rendered.contains("   12:   }"));
    assert!(!rendered.contains("pickPhoto() {"));
}

#[test]
fn ordinary_methods_in_components_are_named_matches() {
    let dir = fixture();
    let locator = TreeSitterLocator::new(dir.path());

    let rendered = locator.locate("pickPhoto", None);
    assert_eq!(rendered.matches("File: ").count(), 1);
    assert!(rendered.contains("   14:   async pickPhoto() {"));
    assert!(rendered.contains("   16:     this.imgPath = uri;"));
}

#[test]
fn qualified_cpp_names_match_on_last_segment() {
    let dir = fixture();
    let locator = TreeSitterLocator::new(dir.path());

    let rendered = locator.locate("Scan", None);
    assert!(rendered.contains("gallery.cpp"));
    assert!(rendered.contains("    8: int Scanner::Scan(const char *path) {"));
}

#[test]
fn no_match_is_an_empty_string() {
    let dir = fixture();
    let locator = TreeSitterLocator::new(dir.path());

    assert_eq!(locator.locate("doesNotExist", None), "");
    assert_eq!(
        locator.locate("openGallery", Some(&dir.path().join("missing"))),
        ""
    );
}

#[test]
fn repeated_lookups_are_identical() {
    let dir = fixture();
    let locator = TreeSitterLocator::new(dir.path());
    let pages = dir.path().join("entry/pages");

    let first = locator.locate(BUILD_SENTINEL, Some(&pages));
    let second = locator.locate(BUILD_SENTINEL, Some(&pages));
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn excluded_directories_are_not_searched() {
    let dir = fixture();
    write(dir.path(), "oh_modules/vendor/picker.ts", PICKER_TS);

    let all = TreeSitterLocator::new(dir.path()).locate("openGallery", None);
    assert_eq!(all.matches("File: ").count(), 3);

    let filtered = TreeSitterLocator::new(dir.path())
        .with_exclude_dirs(vec!["oh_modules".to_string()])
        .locate("openGallery", None);
    assert_eq!(filtered.matches("File: ").count(), 2);
}

#[test]
fn invalid_utf8_files_are_decoded_lossily() {
    let dir = fixture();
    let mut bytes = b"// \xff\xfe legacy header\n".to_vec();
    bytes.extend_from_slice(b"function legacy() {\n  return 1;\n}\n");
    fs::write(dir.path().join("legacy.js"), bytes).unwrap();

    let rendered = TreeSitterLocator::new(dir.path()).locate("legacy", None);
    assert!(rendered.contains("    2: function legacy() {"));
}

#[test]
fn component_blocks_do_not_hide_later_members() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "entry/pages/Profile.ets", PROFILE_ETS);
    let locator = TreeSitterLocator::new(dir.path());

    let build = locator.locate(BUILD_SENTINEL, None);
    assert_eq!(build.matches("File: ").count(), 1);
    assert!(build.contains("   15:   build() {"));
    assert!(build.contains("   22:       }.margin(10)"));
    assert!(build.contains("   38:     .width('100%')"));
    assert!(build.ends_with("   40:   }\n"));
    assert!(!build.contains("TabBuilder"));

    let pick = locator.locate("pickPhoto", None);
    assert!(pick.starts_with("File: "));
    assert!(pick.contains("   48:   async pickPhoto() {"));
    assert!(pick.ends_with("   51:   }\n"));

    let builder = locator.locate("TabBuilder", None);
    assert!(builder.contains("   42:   @Builder TabBuilder(title: string) {"));
    assert!(builder.ends_with("   46:   }\n"));

    assert!(locator.locate("aboutToAppear", None).contains("   11:   aboutToAppear() {"));
    assert!(locator.locate("fillScreen", None).contains("   54: @Styles function fillScreen() {"));

    // Component calls are not declarations.
    assert_eq!(locator.locate("Column", None), "");
    assert_eq!(locator.locate("Row", None), "");
}
